use serde::Deserialize;

use crate::errors::AppError;
use crate::forms::FormData;

/// One entry of the `experienceDetails` JSON array posted with a profile form.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExperienceDetailInput {
    pub company_name: String,
    pub role: String,
    pub duration: String,
    pub location: String,
    pub initial: String,
    pub color: String,
}

/// Text fields of a profile form. `None` means the field was absent or blank.
#[derive(Debug, Clone, Default)]
pub struct ProfileFields {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub job_title: Option<String>,
    pub experience: Option<String>,
    pub education: Option<String>,
    pub skills: Option<String>,
    pub bio: Option<String>,
}

impl ProfileFields {
    pub fn from_form(form: &FormData) -> Self {
        let get = |name: &str| form.text(name).map(str::to_string);
        Self {
            first_name: get("firstName"),
            last_name: get("lastName"),
            email: get("email"),
            phone: get("phone"),
            address: get("address"),
            city: get("city"),
            state: get("state"),
            postal_code: get("postalCode"),
            country: get("country"),
            job_title: get("jobTitle"),
            experience: get("experience"),
            education: get("education"),
            skills: get("skills"),
            bio: get("bio"),
        }
    }

    /// `"{first} {last}"`, trimmed; `None` when both names are missing.
    pub fn full_name(&self) -> Option<String> {
        let full = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string();
        (!full.is_empty()).then_some(full)
    }
}

/// Email of the account a session may claim. The verified session email wins;
/// the form value is only used when the identity provider supplied none.
pub fn account_email(
    session_email: Option<&str>,
    form_email: Option<&str>,
) -> Result<String, AppError> {
    session_email
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .or(form_email)
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation("email is required".to_string()))
}

/// Parses the `experienceDetails` field; `None` when the form didn't send it.
pub fn parse_experience_details(
    form: &FormData,
) -> Result<Option<Vec<ExperienceDetailInput>>, AppError> {
    form.text("experienceDetails")
        .map(|raw| {
            serde_json::from_str(raw).map_err(|e| {
                AppError::Validation(format!("experienceDetails must be a JSON array: {e}"))
            })
        })
        .transpose()
}
