//! Model-name → token-limit table used by the runner's pre-flight check.

/// Limit assumed for a model we have no entry for.
pub const FALLBACK_LIMIT: usize = 100_000;

/// Maximum prompt tokens a model accepts in one request. Matching is by
/// prefix, longest entries first, so "gpt-4o-mini" resolves before "gpt-4".
pub fn limit_for_model(model: &str) -> usize {
    if model.starts_with("gemini-1.5-pro") {
        2_097_152
    } else if model.starts_with("gemini-1.5") {
        1_048_576
    } else if model.starts_with("gemini-pro") {
        32_760
    } else if model.starts_with("gpt-4o") || model.starts_with("gpt-4-turbo") {
        128_000
    } else if model.starts_with("gpt-4") {
        8_192
    } else if model.starts_with("gpt-3.5-turbo") {
        16_385
    } else if model.starts_with("claude-3") {
        200_000
    } else {
        FALLBACK_LIMIT
    }
}
