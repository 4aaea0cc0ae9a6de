use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::models::AppointmentStatus;

/// Interface languages the dashboard ships with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Pt,
    En,
    Es,
    Fr,
}

const MONTHS_PT: [&str; 12] = [
    "janeiro", "fevereiro", "março", "abril", "maio", "junho",
    "julho", "agosto", "setembro", "outubro", "novembro", "dezembro",
];

const MONTHS_EN: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];

const MONTHS_ES: [&str; 12] = [
    "enero", "febrero", "marzo", "abril", "mayo", "junio",
    "julio", "agosto", "septiembre", "octubre", "noviembre", "diciembre",
];

const MONTHS_FR: [&str; 12] = [
    "janvier", "février", "mars", "avril", "mai", "juin",
    "juillet", "août", "septembre", "octobre", "novembre", "décembre",
];

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::Pt => "pt",
            Language::En => "en",
            Language::Es => "es",
            Language::Fr => "fr",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::Pt => "Português",
            Language::En => "English",
            Language::Es => "Español",
            Language::Fr => "Français",
        }
    }

    /// Full month name, `month` is 1-based
    pub fn month_name(self, month: u32) -> &'static str {
        let table = match self {
            Language::Pt => &MONTHS_PT,
            Language::En => &MONTHS_EN,
            Language::Es => &MONTHS_ES,
            Language::Fr => &MONTHS_FR,
        };
        table[(month.clamp(1, 12) - 1) as usize]
    }

    /// Abbreviated month name (first three characters of the full name)
    pub fn short_month_name(self, month: u32) -> String {
        self.month_name(month).chars().take(3).collect()
    }

    /// "1 de junho de 2024" style joiner between day, month and year
    pub fn date_joiner(self) -> &'static str {
        match self {
            Language::Pt | Language::Es => " de ",
            Language::En | Language::Fr => " ",
        }
    }

    pub fn status_label(self, status: AppointmentStatus) -> &'static str {
        use AppointmentStatus::*;
        match (self, status) {
            (Language::Pt, Pending) => "Pendente",
            (Language::Pt, Confirmed) => "Confirmado",
            (Language::Pt, Completed) => "Concluído",
            (Language::Pt, Cancelled) => "Cancelado",
            (Language::En, Pending) => "Pending",
            (Language::En, Confirmed) => "Confirmed",
            (Language::En, Completed) => "Completed",
            (Language::En, Cancelled) => "Cancelled",
            (Language::Es, Pending) => "Pendiente",
            (Language::Es, Confirmed) => "Confirmado",
            (Language::Es, Completed) => "Completado",
            (Language::Es, Cancelled) => "Cancelado",
            (Language::Fr, Pending) => "En attente",
            (Language::Fr, Confirmed) => "Confirmé",
            (Language::Fr, Completed) => "Terminé",
            (Language::Fr, Cancelled) => "Annulé",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pt" => Ok(Language::Pt),
            "en" => Ok(Language::En),
            "es" => Ok(Language::Es),
            "fr" => Ok(Language::Fr),
            other => Err(ValidationError::UnknownLanguage(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_language_codes_case_insensitively() {
        assert_eq!("EN".parse::<Language>().unwrap(), Language::En);
        assert_eq!(" fr ".parse::<Language>().unwrap(), Language::Fr);
        assert!("de".parse::<Language>().is_err());
    }

    #[test]
    fn short_month_names_respect_multibyte_characters() {
        assert_eq!(Language::Fr.short_month_name(2), "fév");
        assert_eq!(Language::Pt.short_month_name(3), "mar");
        assert_eq!(Language::En.short_month_name(6), "Jun");
    }
}
