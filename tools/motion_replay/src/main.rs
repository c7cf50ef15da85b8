use std::{
    env,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    process,
};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_time::Instant;
use threshold_temp_layer::{
    processor::{active_source, AxisPairing, LayerId, PositionId, RelativeAxis},
    BindingParams, KeyPositionEvent, LayerControl, MotionSample, ProcessorConfig,
    SharedProcessor, ThresholdLayerProcessor,
};

#[derive(Clone, Copy, Debug)]
enum TraceEvent {
    Motion(MotionSample),
    Key(KeyPositionEvent),
    Tick,
}

#[derive(Clone, Copy, Debug)]
struct TraceRow {
    ms: u64,
    event: TraceEvent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LayerCommand {
    Activate(LayerId),
    Deactivate(LayerId),
}

#[derive(Default)]
struct ReplayLayers {
    pending: Vec<LayerCommand>,
}

impl LayerControl for ReplayLayers {
    fn activate(&mut self, layer: LayerId) {
        self.pending.push(LayerCommand::Activate(layer));
    }

    fn deactivate(&mut self, layer: LayerId) {
        self.pending.push(LayerCommand::Deactivate(layer));
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ReplayAction {
    ms: u64,
    command: LayerCommand,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(usage());
    }

    let mut trace_path: Option<PathBuf> = None;
    let mut expect_path: Option<PathBuf> = None;
    let mut bindings: Vec<BindingParams> = Vec::new();
    let mut idle_ms: Option<u32> = None;
    let mut pairing: Option<AxisPairing> = None;

    let mut idx = 1usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "--expect" => {
                idx += 1;
                let Some(path) = args.get(idx) else {
                    return Err("missing path after --expect".into());
                };
                expect_path = Some(PathBuf::from(path));
            }
            "--binding" => {
                idx += 1;
                let Some(raw) = args.get(idx) else {
                    return Err("missing layer,timeout_ms,threshold after --binding".into());
                };
                bindings.push(parse_binding(raw)?);
            }
            "--idle-ms" => {
                idx += 1;
                let Some(raw) = args.get(idx) else {
                    return Err("missing value after --idle-ms".into());
                };
                idle_ms = Some(
                    raw.trim()
                        .parse::<u32>()
                        .map_err(|e| format!("invalid --idle-ms '{raw}': {e}"))?,
                );
            }
            "--pairing" => {
                idx += 1;
                let Some(raw) = args.get(idx) else {
                    return Err("missing value after --pairing".into());
                };
                pairing = Some(parse_pairing(raw)?);
            }
            "-h" | "--help" => {
                println!("{}", usage());
                return Ok(());
            }
            value if value.starts_with('-') => {
                return Err(format!("unknown argument: {value}"));
            }
            value => {
                if trace_path.is_some() {
                    return Err("multiple trace paths provided".into());
                }
                trace_path = Some(PathBuf::from(value));
            }
        }
        idx += 1;
    }

    let trace_path = trace_path.ok_or_else(usage)?;
    let rows = parse_trace(&trace_path)?;

    let source = active_source();
    if bindings.is_empty() {
        bindings.extend_from_slice(source.bindings);
    }
    let config = ProcessorConfig::new(
        idle_ms.unwrap_or(source.require_prior_idle_ms),
        source.excluded_positions,
    )
    .map_err(|e| e.to_string())?
    .with_axis_pairing(pairing.unwrap_or(source.axis_pairing));

    let actions = replay(config, &bindings, &rows);

    println!("action,ms,kind,layer");
    for action in &actions {
        let (kind, layer) = command_parts(action.command);
        println!("action,{},{},{}", action.ms, kind, layer);
    }

    if let Some(expect_path) = expect_path {
        let expected = parse_expected(&expect_path)?;
        let actual: Vec<LayerCommand> = actions.iter().map(|a| a.command).collect();
        if actual != expected {
            eprintln!("expected: {}", join_commands(&expected));
            eprintln!("actual:   {}", join_commands(&actual));
            return Err("layer action sequence mismatch".into());
        }
    }

    Ok(())
}

fn usage() -> String {
    "usage: motion_replay <trace.csv> [--binding layer,timeout_ms,threshold]... \
     [--idle-ms N] [--pairing per-sample|sync-report] [--expect expected_actions.txt]"
        .to_string()
}

/// Feeds every motion row to each binding in order. Timers due at or before a
/// row fire ahead of it; timers still pending after the last row are flushed.
fn replay(config: ProcessorConfig, bindings: &[BindingParams], rows: &[TraceRow]) -> Vec<ReplayAction> {
    let shared: SharedProcessor<NoopRawMutex, ReplayLayers> =
        SharedProcessor::new(ThresholdLayerProcessor::new(config), ReplayLayers::default());
    let mut actions = Vec::new();

    for row in rows {
        let now = Instant::from_millis(row.ms);
        fire_due(&shared, Some(now), &mut actions);

        match row.event {
            TraceEvent::Motion(sample) => {
                for binding in bindings {
                    shared.handle_motion_at(now, binding, sample);
                }
            }
            TraceEvent::Key(event) => {
                shared.handle_key_at(now, event);
            }
            TraceEvent::Tick => {}
        }
        drain(&shared, row.ms, &mut actions);
    }

    fire_due(&shared, None, &mut actions);
    actions
}

fn fire_due(
    shared: &SharedProcessor<NoopRawMutex, ReplayLayers>,
    until: Option<Instant>,
    actions: &mut Vec<ReplayAction>,
) {
    while let Some(deadline) = shared.next_deadline() {
        if until.is_some_and(|until| deadline > until) {
            break;
        }
        shared.fire_expired_at(deadline);
        drain(shared, deadline.as_millis(), actions);
    }
}

fn drain(
    shared: &SharedProcessor<NoopRawMutex, ReplayLayers>,
    ms: u64,
    actions: &mut Vec<ReplayAction>,
) {
    shared.with_layers(|layers| {
        actions.extend(
            layers
                .pending
                .drain(..)
                .map(|command| ReplayAction { ms, command }),
        );
    });
}

fn parse_trace(path: &Path) -> Result<Vec<TraceRow>, String> {
    let file = File::open(path).map_err(|e| format!("failed to open {}: {e}", path.display()))?;
    let reader = BufReader::new(file);

    let mut out: Vec<TraceRow> = Vec::new();
    let mut last_ms = 0u64;
    for (line_no, line_result) in reader.lines().enumerate() {
        let line_no = line_no + 1;
        let line = line_result
            .map_err(|e| format!("failed to read {}:{}: {e}", path.display(), line_no))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if parts.len() < 2 {
            return Err(format!(
                "{}:{} invalid trace line, expected at least 2 columns",
                path.display(),
                line_no
            ));
        }

        let ms = parse_num::<u64>(parts[1], path, line_no, "ms")?;
        if ms < last_ms {
            return Err(format!(
                "{}:{} timestamp {} goes backwards (previous {})",
                path.display(),
                line_no,
                ms,
                last_ms
            ));
        }
        last_ms = ms;

        let event = match parts[0] {
            "rel" => {
                if parts.len() < 4 {
                    return Err(format!(
                        "{}:{} rel rows need ms,axis,delta",
                        path.display(),
                        line_no
                    ));
                }
                let axis = parse_axis(parts[2]).ok_or_else(|| {
                    format!("{}:{} invalid axis: {}", path.display(), line_no, parts[2])
                })?;
                let delta = parse_num::<i32>(parts[3], path, line_no, "delta")?;
                let sync = matches!(parts.get(4), Some(&"sync"));
                TraceEvent::Motion(MotionSample { axis, delta, sync })
            }
            "key" => {
                if parts.len() < 4 {
                    return Err(format!(
                        "{}:{} key rows need ms,position,down|up",
                        path.display(),
                        line_no
                    ));
                }
                let position = parse_num::<PositionId>(parts[2], path, line_no, "position")?;
                let event = match parts[3] {
                    "down" | "1" => KeyPositionEvent::pressed(position),
                    "up" | "0" => KeyPositionEvent::released(position),
                    other => {
                        return Err(format!(
                            "{}:{} invalid key state: {}",
                            path.display(),
                            line_no,
                            other
                        ))
                    }
                };
                TraceEvent::Key(event)
            }
            "tick" => TraceEvent::Tick,
            other => {
                return Err(format!(
                    "{}:{} unknown row kind: {}",
                    path.display(),
                    line_no,
                    other
                ))
            }
        };

        out.push(TraceRow { ms, event });
    }

    Ok(out)
}

fn parse_expected(path: &Path) -> Result<Vec<LayerCommand>, String> {
    let file = File::open(path).map_err(|e| format!("failed to open {}: {e}", path.display()))?;
    let reader = BufReader::new(file);

    let mut commands = Vec::new();
    for (line_no, line_result) in reader.lines().enumerate() {
        let line_no = line_no + 1;
        let line = line_result
            .map_err(|e| format!("failed to read {}:{}: {e}", path.display(), line_no))?;
        let token = line.trim();
        if token.is_empty() || token.starts_with('#') {
            continue;
        }

        let command = parse_command(token).ok_or_else(|| {
            format!(
                "{}:{} invalid expected action: {}",
                path.display(),
                line_no,
                token
            )
        })?;
        commands.push(command);
    }

    Ok(commands)
}

fn parse_command(token: &str) -> Option<LayerCommand> {
    let (kind, layer) = token.split_once(',')?;
    let layer = layer.trim().parse::<LayerId>().ok()?;
    match kind.trim().to_ascii_lowercase().as_str() {
        "activate" => Some(LayerCommand::Activate(layer)),
        "deactivate" => Some(LayerCommand::Deactivate(layer)),
        _ => None,
    }
}

fn command_parts(command: LayerCommand) -> (&'static str, LayerId) {
    match command {
        LayerCommand::Activate(layer) => ("activate", layer),
        LayerCommand::Deactivate(layer) => ("deactivate", layer),
    }
}

fn join_commands(commands: &[LayerCommand]) -> String {
    commands
        .iter()
        .map(|command| {
            let (kind, layer) = command_parts(*command);
            format!("{kind}:{layer}")
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_axis(raw: &str) -> Option<RelativeAxis> {
    match raw.to_ascii_lowercase().as_str() {
        "x" => Some(RelativeAxis::X),
        "y" => Some(RelativeAxis::Y),
        "wheel" => Some(RelativeAxis::Wheel),
        "hwheel" => Some(RelativeAxis::HorizontalWheel),
        _ => None,
    }
}

fn parse_pairing(raw: &str) -> Result<AxisPairing, String> {
    match raw.trim() {
        "per-sample" => Ok(AxisPairing::PerSample),
        "sync-report" => Ok(AxisPairing::SyncReport),
        other => Err(format!("invalid --pairing '{other}'")),
    }
}

fn parse_binding(raw: &str) -> Result<BindingParams, String> {
    let cells: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [layer, timeout_ms, threshold] = cells.as_slice() else {
        return Err(format!(
            "invalid --binding '{raw}', expected layer,timeout_ms,threshold"
        ));
    };
    let layer = layer
        .parse::<LayerId>()
        .map_err(|e| format!("invalid binding layer '{layer}': {e}"))?;
    let timeout_ms = timeout_ms
        .parse::<i16>()
        .map_err(|e| format!("invalid binding timeout '{timeout_ms}': {e}"))?;
    let threshold = threshold
        .parse::<u32>()
        .map_err(|e| format!("invalid binding threshold '{threshold}': {e}"))?;
    Ok(BindingParams::new(layer, timeout_ms, threshold))
}

fn parse_num<T>(raw: &str, path: &Path, line_no: usize, field: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        format!(
            "{}:{} invalid {} '{}': {}",
            path.display(),
            line_no,
            field,
            raw.trim(),
            e
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motion(ms: u64, sample: MotionSample) -> TraceRow {
        TraceRow {
            ms,
            event: TraceEvent::Motion(sample),
        }
    }

    fn key(ms: u64, event: KeyPositionEvent) -> TraceRow {
        TraceRow {
            ms,
            event: TraceEvent::Key(event),
        }
    }

    fn commands(actions: &[ReplayAction]) -> Vec<(u64, LayerCommand)> {
        actions.iter().map(|a| (a.ms, a.command)).collect()
    }

    #[test]
    fn replay_fires_timeout_at_deadline() {
        let config = ProcessorConfig::new(0, &[]).expect("config");
        let bindings = [BindingParams::new(3, 500, 100)];
        let rows = [
            motion(0, MotionSample::x(60)),
            motion(10, MotionSample::y(50)),
        ];

        let actions = replay(config, &bindings, &rows);

        assert_eq!(
            commands(&actions),
            [
                (10, LayerCommand::Activate(3)),
                (510, LayerCommand::Deactivate(3)),
            ]
        );
    }

    #[test]
    fn replay_timer_due_at_row_fires_before_it() {
        let config = ProcessorConfig::new(0, &[]).expect("config");
        let bindings = [BindingParams::new(1, 100, 10)];
        let rows = [
            motion(0, MotionSample::x(10)),
            motion(100, MotionSample::x(10)),
        ];

        let actions = replay(config, &bindings, &rows);

        assert_eq!(
            commands(&actions),
            [
                (0, LayerCommand::Activate(1)),
                (100, LayerCommand::Deactivate(1)),
                (100, LayerCommand::Activate(1)),
                (200, LayerCommand::Deactivate(1)),
            ]
        );
    }

    #[test]
    fn replay_key_press_resets_before_timeout() {
        let config = ProcessorConfig::new(0, &[9]).expect("config");
        let bindings = [BindingParams::new(2, 400, 10)];
        let rows = [
            motion(0, MotionSample::x(10)),
            key(50, KeyPositionEvent::pressed(9)),
            key(60, KeyPositionEvent::pressed(4)),
        ];

        let actions = replay(config, &bindings, &rows);

        assert_eq!(
            commands(&actions),
            [
                (0, LayerCommand::Activate(2)),
                (60, LayerCommand::Deactivate(2)),
            ]
        );
    }

    #[test]
    fn bundled_traces_match_expectations() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("traces");
        let source = active_source();
        for name in ["scroll_activation", "key_reset"] {
            let rows = parse_trace(&dir.join(format!("{name}.csv"))).expect("trace parses");
            let expected =
                parse_expected(&dir.join(format!("{name}.expected"))).expect("expectations parse");
            let config = ProcessorConfig::from_source(source).expect("compiled config");

            let actions = replay(config, source.bindings, &rows);
            let actual: Vec<LayerCommand> = actions.iter().map(|a| a.command).collect();
            assert_eq!(actual, expected, "{name}");
        }
    }

    #[test]
    fn binding_argument_parses_three_cells() {
        assert_eq!(
            parse_binding("4, 250, 80"),
            Ok(BindingParams::new(4, 250, 80))
        );
        assert!(parse_binding("4,250").is_err());
        assert!(parse_binding("4,40000,80").is_err());
    }

    #[test]
    fn expected_actions_parse_kind_and_layer() {
        assert_eq!(parse_command("activate,3"), Some(LayerCommand::Activate(3)));
        assert_eq!(
            parse_command("Deactivate, 15"),
            Some(LayerCommand::Deactivate(15))
        );
        assert_eq!(parse_command("toggle,1"), None);
    }
}
