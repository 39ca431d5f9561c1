use serde_json::Value;

pub const AUTHORIZE_TEACHERS: &str = "activity_applications.authorize_teachers";
pub const CAN_EDIT_AVAILABILITIES: &str = "activity_applications.can_edit_availabilities";
pub const IMPORTER_NAME: &str = "activity_applications.importer_name";
pub const DEFAULT_STATUS: &str = "activityApplication.default_status";
pub const AUTOMATIC_STATUS: &str = "activityApplication.automatic_status";
pub const PAYMENT_TERMS_ACTIVATED: &str = "payment_terms.activated";
pub const PAYMENT_STEP_DISPLAY_TEXT: &str = "payment_step.display_text";
pub const ACTIVITY_CHOICE_ACTIVATED: &str = "activity_choice_step.activated";
pub const ACTIVITY_CHOICE_DISPLAY_TEXT: &str = "activity_choice_step.display_text";
pub const AVAILABILITY_MESSAGE: &str = "availability_message";
pub const NOTIFY_WIZARD_ERROR: &str = "app.notify_wizard_error";
pub const MAILER_DEFAULT_FROM: &str = "app.application_mailer.default_from";

pub const DEFAULT_AVAILABILITY_MESSAGE: &str = "Sélectionner plusieurs créneaux de disponibilités, vous aurez ainsi plus de possibilités d'inscription.";

/// A stored setting. Values are kept as text and interpreted through
/// `value_type`.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub label: String,
    pub value: Option<String>,
    pub value_type: String,
}

impl Parameter {
    pub fn parse(&self) -> Value {
        let Some(raw) = self.value.as_deref() else {
            return Value::Null;
        };
        match self.value_type.as_str() {
            "boolean" => match raw.trim() {
                "true" | "1" | "t" => Value::Bool(true),
                "false" | "0" | "f" | "" => Value::Bool(false),
                _ => Value::Null,
            },
            "integer" => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or(Value::Null),
            "json" => serde_json::from_str(raw).unwrap_or(Value::Null),
            _ => Value::String(raw.to_string()),
        }
    }

    pub fn as_bool(&self) -> bool {
        self.parse().as_bool().unwrap_or(false)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.parse().as_i64()
    }

    pub fn as_string(&self) -> Option<String> {
        match self.parse() {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
