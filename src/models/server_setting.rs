/// Inferred type of a server setting value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingType {
    Bool,
    Int,
    Float,
    Str,
}

impl SettingType {
    /// Infer the type from the raw value text.
    pub fn infer(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
            return Self::Bool;
        }

        let digits = value.strip_prefix('-').unwrap_or(value);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return Self::Int;
        }

        if let Some((whole, frac)) = digits.split_once('.') {
            let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
            if all_digits(whole) && all_digits(frac) {
                return Self::Float;
            }
        }

        Self::Str
    }
}

/// A scalar key of the server configuration as shown by a settings editor.
///
/// `comment` joins the `#` lines directly above the key; `min`, `max` and
/// `default` are mined from it (`Min: 1 Max: 32 Default: 8`).
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSetting {
    pub key: String,
    pub value: String,
    pub comment: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub default: Option<String>,
}

impl ServerSetting {
    pub fn value_type(&self) -> SettingType {
        SettingType::infer(&self.value)
    }

    /// Check a candidate value against the type and bounds of this setting.
    ///
    /// The document itself never rejects values; this is for editors.
    pub fn accepts(&self, candidate: &str) -> bool {
        match self.value_type() {
            SettingType::Bool => {
                candidate.eq_ignore_ascii_case("true") || candidate.eq_ignore_ascii_case("false")
            }
            SettingType::Int | SettingType::Float => match candidate.trim().parse::<f64>() {
                Ok(n) => {
                    self.min.is_none_or(|min| n >= min) && self.max.is_none_or(|max| n <= max)
                }
                Err(_) => false,
            },
            SettingType::Str => true,
        }
    }
}
