/// Return the preferred ONNX execution providers for the current platform.
///
/// ONNX Runtime falls back to CPU if the platform-specific provider is unavailable.
pub fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

/// Human-readable names of the providers a session may run on, in priority order.
pub fn execution_provider_names() -> Vec<&'static str> {
    #[cfg(target_os = "macos")]
    {
        vec!["CoreML", "CPU"]
    }
    #[cfg(target_os = "windows")]
    {
        vec!["DirectML", "CPU"]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec!["CPU"]
    }
}
