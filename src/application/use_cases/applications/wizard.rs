use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::application::access::Actor;
use crate::application::dto::applications::Availability;
use crate::application::ports::catalog_repository::{
    APPLICATION_CHANGE_QUESTIONNAIRE, CatalogRepository, NEW_STUDENT_LEVEL_QUESTIONNAIRE,
};
use crate::application::ports::parameter_repository::ParameterRepository;
use crate::application::ports::user_repository::UserRepository;
use crate::application::services::pricing::{CatalogPricer, WizardCatalog, group_packs};
use crate::application::use_cases::applications::season_calendar;
use crate::domain::catalog::activity_ref::{ActivityRef, ActivityRefKind};
use crate::domain::catalog::pricing::PackOffer;
use crate::domain::parameters::{
    ACTIVITY_CHOICE_ACTIVATED, ACTIVITY_CHOICE_DISPLAY_TEXT, AVAILABILITY_MESSAGE,
    DEFAULT_AVAILABILITY_MESSAGE, PAYMENT_STEP_DISPLAY_TEXT, PAYMENT_TERMS_ACTIVATED,
};
use crate::domain::seasons::Season;

#[derive(thiserror::Error, Debug)]
pub enum WizardError {
    #[error("sign in required")]
    Unauthorized,
    #[error("cannot enroll this person")]
    Forbidden,
    #[error(transparent)]
    Repo(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default)]
pub struct WizardRequest {
    pub user_id: Option<i64>,
    pub pre_application_activity_id: Option<i64>,
    pub activity_ref_id: Option<i64>,
    pub action_type: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct School {
    pub name: String,
    pub country_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormulaPrice {
    pub id: Value,
    pub display_price: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExistingUser {
    pub user: Value,
    pub learned_activities: Vec<i64>,
    pub availabilities: Vec<Availability>,
    pub pre_application_activity: Option<Value>,
    pub pre_selected_activity_id: Option<i64>,
    pub next_season: Option<Season>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WizardData {
    pub school_name: String,
    pub country_code: String,
    pub season: Option<Season>,
    pub seasons: Vec<Season>,
    #[serde(flatten)]
    pub catalog: WizardCatalog,
    pub all_activity_refs: Vec<ActivityRef>,
    pub all_activity_ref_kinds: Vec<ActivityRefKind>,
    pub packs: BTreeMap<String, Vec<PackOffer>>,
    pub formules: Value,
    pub formula_prices: Vec<FormulaPrice>,
    pub adhesion_prices: Value,
    pub avail_payment_schedule_options: Value,
    pub avail_payment_methods: Value,
    pub payment_step_display_text: String,
    pub activitychoice_display_text: String,
    pub availability_message: String,
    pub last_adherent_number: Option<i64>,
    pub instruments: Value,
    pub locations: Value,
    pub application_change_questions: Value,
    pub new_student_level_questions: Value,
    pub consent_docs: Value,
    pub current_user_is_admin: bool,
    pub action_type: i64,
    pub existing_user: Option<ExistingUser>,
}

pub fn formula_prices(formules: &Value) -> Vec<FormulaPrice> {
    formules
        .as_array()
        .map(|list| {
            list.iter()
                .map(|f| FormulaPrice {
                    id: f.get("id").cloned().unwrap_or(Value::Null),
                    display_price: f
                        .get("display_price")
                        .filter(|p| !p.is_null())
                        .cloned()
                        .unwrap_or_else(|| Value::from(0)),
                })
                .collect()
        })
        .unwrap_or_default()
}

pub struct GetWizard<'a, C, U, P>
where
    C: CatalogRepository + ?Sized,
    U: UserRepository + ?Sized,
    P: ParameterRepository + ?Sized,
{
    pub catalog: &'a C,
    pub users: &'a U,
    pub parameters: &'a P,
}

impl<'a, C, U, P> GetWizard<'a, C, U, P>
where
    C: CatalogRepository + ?Sized,
    U: UserRepository + ?Sized,
    P: ParameterRepository + ?Sized,
{
    async fn flag(&self, label: &str) -> anyhow::Result<bool> {
        Ok(self
            .parameters
            .get(label)
            .await?
            .map(|p| p.as_bool())
            .unwrap_or(false))
    }

    async fn text(&self, label: &str) -> anyhow::Result<Option<String>> {
        Ok(self.parameters.get(label).await?.and_then(|p| p.as_string()))
    }

    pub async fn execute(
        &self,
        actor: Option<&Actor>,
        req: &WizardRequest,
        school: &School,
        now: DateTime<Utc>,
    ) -> Result<WizardData, WizardError> {
        let actor = actor.ok_or(WizardError::Unauthorized)?;
        if let Some(user_id) = req.user_id {
            if !actor.can_create_for(user_id) {
                return Err(WizardError::Forbidden);
            }
        }

        let calendar = season_calendar(self.catalog).await?;
        let season = calendar.current_apps(now).cloned();

        if !self.catalog.has_max_prices().await? {
            tracing::info!("wizard_max_prices_recompute");
            self.catalog.recompute_max_prices().await?;
        }

        let all_refs = self.catalog.activity_refs().await?;
        let mut target_ids: Vec<i64> = all_refs
            .iter()
            .flat_map(|r| std::iter::once(r.id).chain(r.activity_ref_kind_id))
            .collect();
        target_ids.sort_unstable();
        target_ids.dedup();
        let max_prices = self.catalog.max_prices(&target_ids).await?;

        let mut default_ids: Vec<i64> = all_refs
            .iter()
            .filter_map(ActivityRef::default_activity_ref_id)
            .collect();
        default_ids.sort_unstable();
        default_ids.dedup();
        let default_pricings = if default_ids.is_empty() {
            Vec::new()
        } else {
            self.catalog.valid_pricings(&default_ids).await?
        };

        let pricer = CatalogPricer {
            max_prices: &max_prices,
            default_pricings: &default_pricings,
            seasons: calendar.all(),
            season_id: season.as_ref().map(|s| s.id).unwrap_or_default(),
        };
        let catalog = pricer.build(all_refs.clone(), actor.is_admin);

        let packs = match calendar.current(now) {
            Some(current) => group_packs(self.catalog.pack_offers(current.id).await?),
            None => BTreeMap::new(),
        };

        let payment_terms = self.flag(PAYMENT_TERMS_ACTIVATED).await?;
        let (avail_payment_schedule_options, avail_payment_methods, payment_step_display_text) =
            if payment_terms {
                (
                    self.catalog.payment_schedule_options().await?,
                    self.catalog.displayable_payment_methods().await?,
                    self.text(PAYMENT_STEP_DISPLAY_TEXT).await?.unwrap_or_default(),
                )
            } else {
                (Value::Array(vec![]), Value::Array(vec![]), String::new())
            };
        let activitychoice_display_text = if self.flag(ACTIVITY_CHOICE_ACTIVATED).await? {
            self.text(ACTIVITY_CHOICE_DISPLAY_TEXT).await?.unwrap_or_default()
        } else {
            String::new()
        };
        let availability_message = self
            .parameters
            .get(AVAILABILITY_MESSAGE)
            .await?
            .and_then(|p| p.value)
            .unwrap_or_else(|| DEFAULT_AVAILABILITY_MESSAGE.to_string());

        let existing_user = match req.user_id {
            Some(user_id) => Some(self.existing_user(user_id, req, &calendar, now).await?),
            None => None,
        };

        let formules = self.catalog.formulas().await?;
        Ok(WizardData {
            school_name: school.name.clone(),
            country_code: school.country_code.clone(),
            season,
            seasons: calendar.all().to_vec(),
            catalog,
            all_activity_refs: all_refs,
            all_activity_ref_kinds: self.catalog.activity_ref_kinds().await?,
            packs,
            formula_prices: formula_prices(&formules),
            formules,
            adhesion_prices: self.catalog.adhesion_prices().await?,
            avail_payment_schedule_options,
            avail_payment_methods,
            payment_step_display_text,
            activitychoice_display_text,
            availability_message,
            last_adherent_number: self.catalog.last_adherent_number().await?,
            instruments: self.catalog.instruments().await?,
            locations: self.catalog.locations().await?,
            application_change_questions: self
                .catalog
                .questions(APPLICATION_CHANGE_QUESTIONNAIRE)
                .await?,
            new_student_level_questions: self
                .catalog
                .questions(NEW_STUDENT_LEVEL_QUESTIONNAIRE)
                .await?,
            consent_docs: self.catalog.consent_documents().await?,
            current_user_is_admin: actor.is_admin,
            action_type: req.action_type.unwrap_or(0),
            existing_user,
        })
    }

    async fn existing_user(
        &self,
        user_id: i64,
        req: &WizardRequest,
        calendar: &crate::domain::seasons::SeasonCalendar,
        now: DateTime<Utc>,
    ) -> Result<ExistingUser, WizardError> {
        let mut user = self
            .users
            .profile_json(user_id)
            .await?
            .ok_or(WizardError::Forbidden)?;
        let next = calendar.next(now).cloned();

        let mut family_links = Vec::new();
        let mut availabilities = Vec::new();
        if let Some(next) = &next {
            availabilities = self.users.availabilities(user_id, next.id).await?;
            family_links = self.users.family_links_json(user_id, next.id).await?;
            if family_links.is_empty() {
                if let Some(previous) = calendar.previous_of(next) {
                    family_links = self.users.family_links_json(user_id, previous.id).await?;
                }
            }
        }
        if let Some(obj) = user.as_object_mut() {
            obj.insert("family_links_with_user".into(), Value::Array(family_links));
        }

        let pre_application_activity = match req.pre_application_activity_id.filter(|id| *id > 0) {
            Some(id) => self.catalog.pre_application_activity(id).await?,
            None => None,
        };

        Ok(ExistingUser {
            user,
            learned_activities: self.users.learned_activity_ref_ids(user_id).await?,
            availabilities,
            pre_application_activity,
            pre_selected_activity_id: req.activity_ref_id.filter(|id| *id != 0),
            next_season: next,
        })
    }
}
