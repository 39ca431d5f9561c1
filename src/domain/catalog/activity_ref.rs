use serde::Serialize;

pub const CHILDHOOD_TYPE: &str = "child";
pub const CHAM_TYPE: &str = "cham";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActivityRefKind {
    pub id: i64,
    pub name: String,
    pub is_for_child: bool,
    pub default_activity_ref_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActivityRef {
    pub id: i64,
    pub label: String,
    pub kind: String,
    pub activity_ref_kind_id: Option<i64>,
    pub activity_type: Option<String>,
    pub is_lesson: bool,
    pub is_visible_to_admin: bool,
    pub substitutable: bool,
    pub activity_ref_kind: Option<ActivityRefKind>,
}

impl ActivityRef {
    pub fn display_name(&self) -> &str {
        &self.label
    }

    pub fn is_childhood(&self) -> bool {
        self.activity_type.as_deref() == Some(CHILDHOOD_TYPE)
    }

    pub fn is_cham(&self) -> bool {
        self.activity_type.as_deref() == Some(CHAM_TYPE)
    }

    pub fn default_activity_ref_id(&self) -> Option<i64> {
        self.activity_ref_kind
            .as_ref()
            .and_then(|k| k.default_activity_ref_id)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EvaluationLevelRef {
    pub id: i64,
    pub value: i32,
    pub label: String,
}
