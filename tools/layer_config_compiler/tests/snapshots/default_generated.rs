// @generated by layer_config_compiler. Do not edit.

pub const PROCESSOR_CONFIG_SOURCE: ProcessorConfigSource = ProcessorConfigSource {
    require_prior_idle_ms: 150,
    excluded_positions: &[40, 41, 42],
    axis_pairing: AxisPairing::PerSample,
    bindings: &[
        BindingParams {
            layer: 3,
            timeout_ms: 600,
            activation_threshold: 120,
        },
    ],
};
