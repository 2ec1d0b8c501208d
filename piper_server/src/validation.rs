use crate::error::ApiError;

/// Validate TTS request text
pub fn validate_tts_request(text: &str, max_len: usize) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    let len = text.chars().count();
    if len > max_len {
        return Err(ApiError::InvalidInput(format!(
            "Text too long ({} characters, max {})",
            len, max_len
        )));
    }
    Ok(())
}

/// Validate an optional scale override (speed, pitch or glottal)
pub fn validate_scale(name: &str, value: Option<f32>) -> Result<(), ApiError> {
    match value {
        Some(v) if !v.is_finite() || v <= 0.0 => Err(ApiError::InvalidInput(format!(
            "Invalid {} scale: {}. Expected a positive number",
            name, v
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tts_request_valid() {
        assert!(validate_tts_request("Hello", 5000).is_ok());
    }

    #[test]
    fn test_validate_tts_request_empty_text() {
        for text in ["", "   ", "\n\t"] {
            let result = validate_tts_request(text, 5000);
            assert!(matches!(result, Err(ApiError::InvalidInput(msg)) if msg.contains("empty")));
        }
    }

    #[test]
    fn test_validate_tts_request_too_long() {
        let long_text = "a".repeat(6000);
        let result = validate_tts_request(&long_text, 5000);
        assert!(matches!(result, Err(ApiError::InvalidInput(msg)) if msg.contains("too long")));
    }

    #[test]
    fn test_validate_tts_request_counts_chars_not_bytes() {
        let text = "é".repeat(10);
        assert!(validate_tts_request(&text, 10).is_ok());
    }

    #[test]
    fn test_validate_scale() {
        assert!(validate_scale("pitch", None).is_ok());
        assert!(validate_scale("pitch", Some(1.2)).is_ok());
        assert!(validate_scale("pitch", Some(0.0)).is_err());
        assert!(validate_scale("speed", Some(-0.5)).is_err());
        assert!(validate_scale("glottal", Some(f32::INFINITY)).is_err());
    }
}
