/// Placed between vision output and the text layer in the combined corpus.
pub const TEXT_LAYER_SEPARATOR: &str = "\n\n--- TEXT LAYER ---\n\n";

/// Below this many characters the text layer adds nothing over vision.
const MIN_TEXT_LAYER_CHARS: usize = 50;

/// Merge the text layer with vision output. Vision comes first since it
/// keeps table and chart structure the text layer loses.
pub fn combine(text_layer: &str, vision_text: Option<&str>) -> String {
    let Some(vision_text) = vision_text.filter(|v| !v.trim().is_empty()) else {
        return text_layer.to_string();
    };

    if text_layer.trim().chars().count() < MIN_TEXT_LAYER_CHARS {
        return vision_text.to_string();
    }

    format!("{}{}{}", vision_text, TEXT_LAYER_SEPARATOR, text_layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_vision_returns_text_layer() {
        assert_eq!(combine("layer", None), "layer");
        assert_eq!(combine("layer", Some("   ")), "layer");
    }

    #[test]
    fn short_text_layer_is_replaced_by_vision() {
        assert_eq!(combine("", Some("ABC")), "ABC");
        assert_eq!(combine(&"a".repeat(49), Some("XYZ")), "XYZ");
    }

    #[test]
    fn vision_precedes_long_text_layer() {
        let layer = "a".repeat(50);
        let combined = combine(&layer, Some("V"));

        assert_eq!(combined, format!("V{}{}", TEXT_LAYER_SEPARATOR, layer));
        assert!(combined.find('V') < combined.find(&layer));
    }
}
