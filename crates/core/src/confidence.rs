use crate::models::EngineKind;

/// Below this many characters the primary engine output is treated as empty.
pub const PRIMARY_MIN_CHARS: usize = 50;
/// Primary confidence saturates at this many characters.
pub const PRIMARY_SATURATION_CHARS: usize = 1_000;
/// The fallback engine needs more than this many characters to score at all.
pub const FALLBACK_MIN_CHARS: usize = 100;
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Advisory confidence in `[0, 1]` for an extraction of `char_count`
/// characters. It gates nothing by itself.
pub fn score(char_count: usize, engine: EngineKind) -> f64 {
    match engine {
        EngineKind::Primary if char_count > PRIMARY_MIN_CHARS => {
            (char_count as f64 / PRIMARY_SATURATION_CHARS as f64).min(1.0)
        }
        EngineKind::Fallback if char_count > FALLBACK_MIN_CHARS => FALLBACK_CONFIDENCE,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_scales_until_saturation() {
        assert_eq!(score(1_500, EngineKind::Primary), 1.0);
        assert_eq!(score(1_000, EngineKind::Primary), 1.0);
        assert!((score(400, EngineKind::Primary) - 0.4).abs() < f64::EPSILON);
        assert!((score(51, EngineKind::Primary) - 0.051).abs() < 1e-9);
    }

    #[test]
    fn primary_near_empty_is_zero() {
        assert_eq!(score(50, EngineKind::Primary), 0.0);
        assert_eq!(score(0, EngineKind::Primary), 0.0);
    }

    #[test]
    fn fallback_is_flat_and_capped() {
        assert_eq!(score(101, EngineKind::Fallback), 0.3);
        assert_eq!(score(50_000, EngineKind::Fallback), 0.3);
        assert_eq!(score(100, EngineKind::Fallback), 0.0);
    }
}
