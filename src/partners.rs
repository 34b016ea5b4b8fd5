use serde::Deserialize;

use crate::model::{FieldError, is_email};

/// Inquiries accepted per e-mail address within [`WINDOW_HOURS`].
pub const MAX_PER_WINDOW: i64 = 5;
pub const WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartnerType {
    Mops,
    Facility,
    Association,
    Other,
}

impl PartnerType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mops" => Some(PartnerType::Mops),
            "facility" => Some(PartnerType::Facility),
            "association" => Some(PartnerType::Association),
            "other" => Some(PartnerType::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PartnerType::Mops => "mops",
            PartnerType::Facility => "facility",
            PartnerType::Association => "association",
            PartnerType::Other => "other",
        }
    }
}

/// Review stage of an inquiry in the admin panel.
pub const INQUIRY_STATUSES: [&str; 4] = ["new", "contacted", "completed", "archived"];

/// Partnership form as posted by the site.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InquiryInput {
    pub name: String,
    pub email: String,
    pub organization: String,
    #[serde(alias = "partnerType")]
    pub partner_type: String,
    pub phone: Option<String>,
    pub message: String,
    #[serde(alias = "gdprConsent")]
    pub gdpr_consent: bool,
}

/// A validated inquiry, trimmed and with the e-mail lowercased.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInquiry {
    pub name: String,
    pub email: String,
    pub organization: String,
    pub partner_type: PartnerType,
    pub phone: Option<String>,
    pub message: String,
}

fn check_length(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    value: &str,
    (min, max): (usize, usize),
    (too_short, too_long): (&str, &str),
) {
    let n = value.chars().count();
    if n < min {
        errors.push(FieldError::new(field, too_short));
    } else if n > max {
        errors.push(FieldError::new(field, too_long));
    }
}

impl InquiryInput {
    pub fn validate(&self) -> Result<NewInquiry, Vec<FieldError>> {
        let mut errors = Vec::new();
        let name = self.name.trim();
        let organization = self.organization.trim();
        let message = self.message.trim();
        let email = self.email.trim().to_lowercase();

        check_length(
            &mut errors,
            "name",
            name,
            (2, 100),
            ("Imię i nazwisko musi mieć minimum 2 znaki", "Imię i nazwisko jest za długie"),
        );
        if !is_email(&email) {
            errors.push(FieldError::new("email", "Nieprawidłowy adres email"));
        }
        check_length(
            &mut errors,
            "organization",
            organization,
            (2, 200),
            ("Nazwa organizacji musi mieć minimum 2 znaki", "Nazwa organizacji jest za długa"),
        );
        let partner_type = PartnerType::parse(&self.partner_type);
        if partner_type.is_none() {
            errors.push(FieldError::new("partner_type", "Wybierz typ partnera"));
        }
        check_length(
            &mut errors,
            "message",
            message,
            (10, 2000),
            ("Wiadomość musi mieć minimum 10 znaków", "Wiadomość jest za długa"),
        );
        if !self.gdpr_consent {
            errors.push(FieldError::new(
                "gdpr_consent",
                "Musisz wyrazić zgodę na przetwarzanie danych",
            ));
        }

        match partner_type {
            Some(partner_type) if errors.is_empty() => Ok(NewInquiry {
                name: name.to_string(),
                email,
                organization: organization.to_string(),
                partner_type,
                phone: self
                    .phone
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
                message: message.to_string(),
            }),
            _ => Err(errors),
        }
    }
}
