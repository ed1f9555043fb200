use crate::error::{VidstampError, VidstampResult};

/// Solid RGB color, configured as a `#RGB` or `#RRGGBB` hex string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn white() -> Self {
        Self::new(255, 255, 255)
    }

    pub const fn black() -> Self {
        Self::new(0, 0, 0)
    }

    /// Straight-alpha RGBA8 with the given alpha.
    pub const fn rgba8(self, alpha: u8) -> [u8; 4] {
        [self.r, self.g, self.b, alpha]
    }

    pub fn parse(hex: &str) -> VidstampResult<Self> {
        let digits = hex.strip_prefix('#').ok_or_else(|| {
            VidstampError::validation(format!("color '{hex}' must start with '#'"))
        })?;

        let component = |s: &str| {
            u8::from_str_radix(s, 16).map_err(|_| {
                VidstampError::validation(format!("color '{hex}' has invalid hex digits"))
            })
        };

        match digits.len() {
            // #RGB: each digit doubled (0xA -> 0xAA).
            3 => Ok(Self::new(
                component(&digits[0..1])? * 17,
                component(&digits[1..2])? * 17,
                component(&digits[2..3])? * 17,
            )),
            6 => Ok(Self::new(
                component(&digits[0..2])?,
                component(&digits[2..4])?,
                component(&digits[4..6])?,
            )),
            n => Err(VidstampError::validation(format!(
                "color '{hex}' must be #RGB or #RRGGBB, got {n} hex digits"
            ))),
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl serde::Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Color {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rrggbb() {
        assert_eq!(Color::parse("#FF0000").unwrap(), Color::new(255, 0, 0));
        assert_eq!(Color::parse("#00ff00").unwrap(), Color::new(0, 255, 0));
        assert_eq!(Color::parse("#000000").unwrap(), Color::black());
    }

    #[test]
    fn parse_rgb_doubles_digits() {
        assert_eq!(Color::parse("#FFF").unwrap(), Color::white());
        assert_eq!(Color::parse("#abc").unwrap(), Color::new(170, 187, 204));
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(Color::parse("FF0000").is_err());
        assert!(Color::parse("#FF00").is_err());
        assert!(Color::parse("#GGGGGG").is_err());
    }

    #[test]
    fn serde_roundtrips_as_hex_string() {
        let c: Color = serde_json::from_str("\"#1A2B3C\"").unwrap();
        assert_eq!(c, Color::new(0x1A, 0x2B, 0x3C));
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"#1A2B3C\"");
    }
}
