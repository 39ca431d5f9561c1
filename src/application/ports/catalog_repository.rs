use async_trait::async_trait;
use serde_json::Value;

use crate::domain::applications::status::ApplicationStatus;
use crate::domain::catalog::activity_ref::{ActivityRef, ActivityRefKind, EvaluationLevelRef};
use crate::domain::catalog::pricing::{MaxPrice, PackOffer, RefPricing};
use crate::domain::seasons::Season;

pub const APPLICATION_CHANGE_QUESTIONNAIRE: &str = "application_change_questionnaire";
pub const NEW_STUDENT_LEVEL_QUESTIONNAIRE: &str = "new_student_level_questionnaire";

/// Reference data: seasons, the activity catalog, prices and wizard lists.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn seasons(&self) -> anyhow::Result<Vec<Season>>;
    async fn statuses(&self) -> anyhow::Result<Vec<ApplicationStatus>>;
    async fn status(&self, id: i64) -> anyhow::Result<Option<ApplicationStatus>>;
    async fn evaluation_level_refs(&self) -> anyhow::Result<Vec<EvaluationLevelRef>>;
    async fn activity_refs(&self) -> anyhow::Result<Vec<ActivityRef>>;
    async fn activity_ref_kinds(&self) -> anyhow::Result<Vec<ActivityRefKind>>;

    async fn max_prices(&self, target_ids: &[i64]) -> anyhow::Result<Vec<MaxPrice>>;
    async fn has_max_prices(&self) -> anyhow::Result<bool>;
    /// Rebuilds the per-season maximum price table from the pricing lines.
    async fn recompute_max_prices(&self) -> anyhow::Result<()>;
    async fn valid_pricings(&self, activity_ref_ids: &[i64]) -> anyhow::Result<Vec<RefPricing>>;
    async fn pack_offers(&self, season_id: i64) -> anyhow::Result<Vec<PackOffer>>;

    async fn formulas(&self) -> anyhow::Result<Value>;
    async fn adhesion_prices(&self) -> anyhow::Result<Value>;
    async fn payment_schedule_options(&self) -> anyhow::Result<Value>;
    async fn displayable_payment_methods(&self) -> anyhow::Result<Value>;
    async fn instruments(&self) -> anyhow::Result<Value>;
    async fn locations(&self) -> anyhow::Result<Value>;
    async fn questions(&self, questionnaire: &str) -> anyhow::Result<Value>;
    async fn consent_documents(&self) -> anyhow::Result<Value>;
    async fn last_adherent_number(&self) -> anyhow::Result<Option<i64>>;
    async fn pre_application_activity(&self, id: i64) -> anyhow::Result<Option<Value>>;
}
