use async_trait::async_trait;
use sqlx::{PgConnection, Row};

use crate::application::dto::enrollment_plan::{
    EnrollmentOutcome, EnrollmentPlan, FamilyLinkPlan, PersonTarget, PlannedApplication,
};
use crate::application::ports::enrollment_repository::{EnrollmentRepository, EnrollmentWriteError};
use crate::domain::applications::status::ASSESSMENT_PENDING_ID;
use crate::infrastructure::db::PgPool;
use crate::infrastructure::db::repositories::application_repository_sqlx::SqlxApplicationRepository;

pub struct SqlxEnrollmentRepository {
    pub pool: PgPool,
}

impl SqlxEnrollmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_write_error(err: anyhow::Error) -> EnrollmentWriteError {
    match err.downcast::<EnrollmentWriteError>() {
        Ok(write) => write,
        Err(other) => EnrollmentWriteError::Other(other),
    }
}

async fn resolve_person(conn: &mut PgConnection, plan: &EnrollmentPlan) -> anyhow::Result<i64> {
    let identity = plan.identity.clone().unwrap_or_default();
    match plan.person {
        PersonTarget::Myself(id) => {
            let exists: bool = sqlx::query("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(id)
                .fetch_one(&mut *conn)
                .await?
                .get(0);
            if !exists {
                return Err(EnrollmentWriteError::NotFound(format!("user {id}")).into());
            }
            Ok(id)
        }
        PersonTarget::Existing(id) => {
            let res = sqlx::query(
                r#"UPDATE users SET first_name = $2, last_name = $3, email = $4, updated_at = now()
                   WHERE id = $1"#,
            )
            .bind(id)
            .bind(&identity.first_name)
            .bind(&identity.last_name)
            .bind(&identity.email)
            .execute(&mut *conn)
            .await?;
            if res.rows_affected() == 0 {
                return Err(EnrollmentWriteError::NotFound(format!("user {id}")).into());
            }
            Ok(id)
        }
        PersonTarget::New { attached_to_id } => {
            let row = sqlx::query(
                r#"INSERT INTO users (first_name, last_name, email, attached_to_id)
                   VALUES ($1, $2, $3, $4) RETURNING id"#,
            )
            .bind(&identity.first_name)
            .bind(&identity.last_name)
            .bind(&identity.email)
            .bind(attached_to_id)
            .fetch_one(&mut *conn)
            .await?;
            Ok(row.get("id"))
        }
    }
}

async fn write_profile(
    conn: &mut PgConnection,
    user_id: i64,
    plan: &EnrollmentPlan,
) -> anyhow::Result<()> {
    let p = &plan.profile;
    sqlx::query(
        r#"UPDATE users SET birthday = COALESCE($2, birthday), sex = COALESCE($3, sex),
                  handicap = $4, handicap_description = $5, checked_gdpr = $6,
                  checked_image_right = $7, checked_newsletter = $8, is_paying = $9,
                  identification_number = $10, updated_at = now()
           WHERE id = $1"#,
    )
    .bind(user_id)
    .bind(p.birthday)
    .bind(&p.sex)
    .bind(p.handicap)
    .bind(&p.handicap_description)
    .bind(p.checked_gdpr)
    .bind(p.checked_image_right)
    .bind(p.checked_newsletter)
    .bind(p.is_paying)
    .bind(&p.identification_number)
    .execute(&mut *conn)
    .await?;

    for level in &plan.levels {
        sqlx::query(
            r#"INSERT INTO levels (user_id, season_id, activity_ref_id, evaluation_level_ref_id)
               SELECT $1, $2, $3, $4
               WHERE NOT EXISTS (SELECT 1 FROM levels
                                 WHERE user_id = $1 AND season_id = $2 AND activity_ref_id = $3)"#,
        )
        .bind(user_id)
        .bind(plan.season_id)
        .bind(level.activity_ref_id)
        .bind(level.evaluation_level_ref_id)
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query("DELETE FROM user_instruments WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        r#"INSERT INTO user_instruments (user_id, instrument_id)
           SELECT $1, UNNEST($2::bigint[]) ON CONFLICT DO NOTHING"#,
    )
    .bind(user_id)
    .bind(&p.instrument_ids)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM telephones WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    for (number, label) in &p.telephones {
        sqlx::query("INSERT INTO telephones (user_id, number, label) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(number)
            .bind(label)
            .execute(&mut *conn)
            .await?;
    }

    if let Some(addresses) = &p.addresses {
        sqlx::query("DELETE FROM addresses WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        for a in addresses {
            sqlx::query(
                r#"INSERT INTO addresses (user_id, street_address, postcode, city, department, country)
                   VALUES ($1, $2, $3, $4, $5, $6)"#,
            )
            .bind(user_id)
            .bind(&a.street_address)
            .bind(&a.postcode)
            .bind(&a.city)
            .bind(&a.department)
            .bind(&a.country)
            .execute(&mut *conn)
            .await?;
        }
    }

    if !plan.availabilities.is_empty() {
        let planning_id: i64 = sqlx::query(
            r#"INSERT INTO plannings (user_id) VALUES ($1)
               ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
               RETURNING id"#,
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?
        .get("id");
        for interval in &plan.availabilities {
            sqlx::query(
                r#"WITH ti AS (
                     INSERT INTO time_intervals (start, "end", kind) VALUES ($2, $3, 'availability')
                     RETURNING id)
                   INSERT INTO time_slots (planning_id, time_interval_id) SELECT $1, ti.id FROM ti"#,
            )
            .bind(planning_id)
            .bind(interval.start)
            .bind(interval.end)
            .execute(&mut *conn)
            .await?;
        }
    }

    for (document_id, agreed) in &plan.consents {
        sqlx::query(
            r#"INSERT INTO consent_document_users (user_id, consent_document_id, has_consented)
               VALUES ($1, $2, $3)
               ON CONFLICT (user_id, consent_document_id) DO UPDATE SET has_consented = EXCLUDED.has_consented"#,
        )
        .bind(user_id)
        .bind(document_id)
        .bind(agreed)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Links family members, creating the missing ones; returns who pays.
async fn write_family(
    conn: &mut PgConnection,
    user_id: i64,
    season_id: i64,
    links: &[FamilyLinkPlan],
) -> anyhow::Result<Vec<i64>> {
    let mut payers = Vec::new();
    for link in links {
        let member_id = match link.member_id {
            Some(id) => id,
            None => sqlx::query(
                r#"INSERT INTO users (first_name, last_name, email, birthday)
                   VALUES ($1, $2, $3, $4) RETURNING id"#,
            )
            .bind(link.first_name.clone().unwrap_or_default())
            .bind(link.last_name.clone().unwrap_or_default())
            .bind(&link.email)
            .bind(link.birthday)
            .fetch_one(&mut *conn)
            .await?
            .get("id"),
        };
        sqlx::query(
            r#"INSERT INTO family_member_users
                 (user_id, member_id, season_id, link, is_to_call, is_accompanying,
                  is_legal_referent, is_paying_for)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               ON CONFLICT (user_id, member_id, season_id) DO UPDATE SET
                 link = EXCLUDED.link, is_to_call = EXCLUDED.is_to_call,
                 is_accompanying = EXCLUDED.is_accompanying,
                 is_legal_referent = EXCLUDED.is_legal_referent,
                 is_paying_for = EXCLUDED.is_paying_for"#,
        )
        .bind(user_id)
        .bind(member_id)
        .bind(season_id)
        .bind(&link.link)
        .bind(link.is_to_call)
        .bind(link.is_accompanying)
        .bind(link.is_legal_referent)
        .bind(link.is_paying_for)
        .execute(&mut *conn)
        .await?;
        if link.is_paying_for {
            payers.push(member_id);
        }
    }
    Ok(payers)
}

async fn write_payment_terms(
    conn: &mut PgConnection,
    user_id: i64,
    plan: &EnrollmentPlan,
) -> anyhow::Result<()> {
    let Some(terms) = &plan.payment_terms else {
        return Ok(());
    };
    sqlx::query("DELETE FROM payer_payment_terms WHERE payer_id = $1 AND season_id = $2")
        .bind(user_id)
        .bind(plan.season_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        r#"INSERT INTO payer_payment_terms
             (payer_id, season_id, payment_schedule_options_id, day_for_collection, payment_method_id)
           VALUES ($1, $2, $3, $4, $5)"#,
    )
    .bind(user_id)
    .bind(plan.season_id)
    .bind(terms.payment_schedule_options_id)
    .bind(terms.day_for_collection)
    .bind(terms.payment_method_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn pre_application_id(
    conn: &mut PgConnection,
    user_id: i64,
    season_id: i64,
) -> anyhow::Result<i64> {
    let existing = sqlx::query(
        "SELECT id FROM pre_applications WHERE user_id = $1 AND season_id = $2 ORDER BY id LIMIT 1",
    )
    .bind(user_id)
    .bind(season_id)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(row) = existing {
        return Ok(row.get("id"));
    }
    let row = sqlx::query("INSERT INTO pre_applications (user_id, season_id) VALUES ($1, $2) RETURNING id")
        .bind(user_id)
        .bind(season_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.get("id"))
}

async fn write_application(
    conn: &mut PgConnection,
    user_id: i64,
    plan: &EnrollmentPlan,
    planned: &PlannedApplication,
) -> anyhow::Result<i64> {
    let application_id: i64 = sqlx::query(
        r#"INSERT INTO activity_applications
             (user_id, season_id, activity_application_status_id, begin_at, formule_id, status_updated_at)
           VALUES ($1, $2, $3, $4, $5, now()) RETURNING id"#,
    )
    .bind(user_id)
    .bind(plan.season_id)
    .bind(plan.initial_status_id)
    .bind(plan.begin_at)
    .bind(planned.formule_id)
    .fetch_one(&mut *conn)
    .await?
    .get("id");

    let desired_id: i64 = sqlx::query(
        r#"INSERT INTO desired_activities (activity_application_id, activity_ref_id, user_id)
           VALUES ($1, $2, $3) RETURNING id"#,
    )
    .bind(application_id)
    .bind(planned.activity_ref_id)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?
    .get("id");

    if let Some((author_id, content)) = &plan.comment {
        sqlx::query(
            "INSERT INTO comments (activity_application_id, user_id, content) VALUES ($1, $2, $3)",
        )
        .bind(application_id)
        .bind(author_id)
        .bind(content)
        .execute(&mut *conn)
        .await?;
    }

    match plan.pre_application_activity_id {
        Some(pre_id) => {
            sqlx::query(
                r#"UPDATE pre_application_activities
                   SET status = true, action = $2, activity_application_id = $3
                   WHERE id = $1"#,
            )
            .bind(pre_id)
            .bind(plan.action.as_str())
            .bind(application_id)
            .execute(&mut *conn)
            .await?;
        }
        None => {
            let pre_application_id = pre_application_id(conn, user_id, plan.season_id).await?;
            sqlx::query(
                r#"INSERT INTO pre_application_desired_activities
                     (pre_application_id, desired_activity_id, activity_application_id, action)
                   VALUES ($1, $2, $3, $4)"#,
            )
            .bind(pre_application_id)
            .bind(desired_id)
            .bind(application_id)
            .bind(plan.action.as_str())
            .execute(&mut *conn)
            .await?;
        }
    }

    for (rank, interval_id) in planned.childhood_preference_interval_ids.iter().enumerate() {
        sqlx::query(
            r#"INSERT INTO time_interval_preferences
                 (user_id, season_id, time_interval_id, activity_ref_id, activity_application_id, rank)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(user_id)
        .bind(plan.season_id)
        .bind(interval_id)
        .bind(planned.activity_ref_id)
        .bind(application_id)
        .bind(rank as i32 + 1)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(answers) = &planned.level_answers {
        sqlx::query(
            r#"INSERT INTO new_student_level_questionnaires (user_id, activity_ref_id, season_id, answers)
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(user_id)
        .bind(planned.activity_ref_id)
        .bind(plan.season_id)
        .bind(sqlx::types::Json(answers))
        .execute(&mut *conn)
        .await?;
    }
    Ok(application_id)
}

/// Books the evaluation slots; a slot already holding a student aborts the enrollment.
async fn book_evaluations(
    conn: &mut PgConnection,
    user_id: i64,
    plan: &EnrollmentPlan,
    applications: &[(i64, i64)],
) -> anyhow::Result<()> {
    for (activity_ref_id, interval_id) in &plan.evaluation_intervals {
        let slot = sqlx::query(
            r#"SELECT ea.id, ea.student_id, ti.start
               FROM evaluation_appointments ea JOIN time_intervals ti ON ti.id = ea.time_interval_id
               WHERE ea.time_interval_id = $1 FOR UPDATE OF ea"#,
        )
        .bind(interval_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| EnrollmentWriteError::NotFound(format!("evaluation interval {interval_id}")))?;
        if slot.get::<Option<i64>, _>("student_id").is_some() {
            let start: chrono::DateTime<chrono::Utc> = slot.get("start");
            return Err(EnrollmentWriteError::IntervalTaken(format!(
                "Le créneau d'évaluation du {} est déjà pris",
                start.format("%d/%m/%Y %H:%M")
            ))
            .into());
        }
        let application_id = applications
            .iter()
            .find(|(ref_id, _)| ref_id == activity_ref_id)
            .map(|(_, id)| *id);
        sqlx::query(
            r#"UPDATE evaluation_appointments
               SET student_id = $2, activity_application_id = $3, activity_ref_id = $4, season_id = $5
               WHERE id = $1"#,
        )
        .bind(slot.get::<i64, _>("id"))
        .bind(user_id)
        .bind(application_id)
        .bind(activity_ref_id)
        .bind(plan.season_id)
        .execute(&mut *conn)
        .await?;
        if let Some(application_id) = application_id {
            sqlx::query(
                r#"UPDATE activity_applications
                   SET activity_application_status_id = $2, status_updated_at = now()
                   WHERE id = $1"#,
            )
            .bind(application_id)
            .bind(ASSESSMENT_PENDING_ID)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

async fn write_packs(
    conn: &mut PgConnection,
    user_id: i64,
    plan: &EnrollmentPlan,
) -> anyhow::Result<bool> {
    let mut created = false;
    for pack in &plan.packs {
        let res = sqlx::query(
            r#"INSERT INTO packs (user_id, activity_ref_pricing_id, season_id, lessons_remaining)
               SELECT $1, p.id, $2, pc.number_lessons
               FROM activity_ref_pricings p
               JOIN activity_refs ar ON ar.id = p.activity_ref_id
               JOIN pricing_categories pc ON pc.id = p.pricing_category_id
               JOIN seasons fs ON fs.id = p.from_season_id
               LEFT JOIN seasons ts ON ts.id = p.to_season_id
               JOIN seasons s ON s.id = $2
               WHERE ar.label = $3 AND p.pricing_category_id = $4 AND p.deleted_at IS NULL
               AND fs.start <= s.start AND (ts.id IS NULL OR ts."end" >= s.start)
               ORDER BY p.id LIMIT 1"#,
        )
        .bind(user_id)
        .bind(plan.season_id)
        .bind(&pack.activity_ref_label)
        .bind(pack.pricing_category_id)
        .execute(&mut *conn)
        .await?;
        created |= res.rows_affected() > 0;
    }
    Ok(created)
}

async fn write_plan(conn: &mut PgConnection, plan: &EnrollmentPlan) -> anyhow::Result<EnrollmentOutcome> {
    let user_id = resolve_person(conn, plan).await?;
    write_profile(conn, user_id, plan).await?;

    let mut payer_ids = write_family(conn, user_id, plan.season_id, &plan.family_links).await?;
    payer_ids.extend(plan.payer_ids.iter().copied());
    if plan.profile.is_paying {
        payer_ids.push(user_id);
    }
    payer_ids.sort_unstable();
    payer_ids.dedup();
    sqlx::query("UPDATE users SET is_paying = true WHERE id = ANY($1)")
        .bind(&payer_ids)
        .execute(&mut *conn)
        .await?;
    write_payment_terms(conn, user_id, plan).await?;

    if let Some(answers) = &plan.change_answers {
        sqlx::query(
            r#"INSERT INTO application_change_questionnaires (user_id, activity_id, season_id, answers)
               VALUES ($1, (SELECT activity_id FROM pre_application_activities WHERE id = $2), $3, $4)"#,
        )
        .bind(user_id)
        .bind(plan.pre_application_activity_id)
        .bind(plan.season_id)
        .bind(sqlx::types::Json(answers))
        .execute(&mut *conn)
        .await?;
    }

    let mut created = Vec::with_capacity(plan.applications.len());
    for planned in &plan.applications {
        let id = write_application(conn, user_id, plan, planned).await?;
        created.push((planned.activity_ref_id, id));
    }
    book_evaluations(conn, user_id, plan, &created).await?;

    let application_ids: Vec<i64> = created.iter().map(|(_, id)| *id).collect();
    if let Some(formule_id) = plan.selected_formule_id {
        sqlx::query(
            r#"UPDATE activity_applications SET formule_id = $2
               WHERE id = ANY($1) AND formule_id IS NULL"#,
        )
        .bind(&application_ids)
        .bind(formule_id)
        .execute(&mut *conn)
        .await?;
    }
    let pack_created = write_packs(conn, user_id, plan).await?;

    let last_application = match application_ids.last() {
        Some(id) => SqlxApplicationRepository::find_in(&mut *conn, *id).await?,
        None => None,
    };
    Ok(EnrollmentOutcome {
        user_id,
        application_ids,
        last_application,
        pack_created,
    })
}

#[async_trait]
impl EnrollmentRepository for SqlxEnrollmentRepository {
    async fn submit(&self, plan: &EnrollmentPlan) -> Result<EnrollmentOutcome, EnrollmentWriteError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EnrollmentWriteError::Other(e.into()))?;
        let outcome = write_plan(&mut tx, plan).await.map_err(into_write_error)?;
        tx.commit()
            .await
            .map_err(|e| EnrollmentWriteError::Other(e.into()))?;
        Ok(outcome)
    }
}
