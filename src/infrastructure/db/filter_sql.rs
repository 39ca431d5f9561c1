use sqlx::{Postgres, QueryBuilder};

use crate::domain::applications::filter::{
    ApplicationFilter, ApplicationQuery, ApplicationSort, SortKey,
};

/// Base relation every application query selects from. Filters refer to
/// `aa` (the application), `u` (its student) and `s` (its season).
pub const FROM_APPLICATIONS: &str = " FROM activity_applications aa \
     JOIN users u ON u.id = aa.user_id \
     JOIN seasons s ON s.id = aa.season_id";

// Characters of ACCENTED past the end of PLAIN are removed by `translate`.
const ACCENTED: &str = "àâäáãéèêëíìîïóòôöõúùûüçñ-'";
const PLAIN: &str = "aaaaaeeeeiiiiooooouuuucn ";

/// Lowercases, strips accents and apostrophes and turns dashes into spaces,
/// the same way the SQL side does.
pub fn fold_name(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter_map(|c| match ACCENTED.chars().position(|a| a == c) {
            Some(i) => PLAIN.chars().nth(i),
            None => Some(c),
        })
        .collect()
}

const MIN_LEVEL: &str = "(SELECT MIN(l.evaluation_level_ref_id) FROM levels l \
     WHERE l.user_id = aa.user_id AND l.season_id = aa.season_id \
     AND l.activity_ref_id IN (SELECT da.activity_ref_id FROM desired_activities da \
     WHERE da.activity_application_id = aa.id))";

const AVAILABILITY_COUNT: &str = "(CASE WHEN EXISTS (SELECT 1 FROM desired_activities da \
     JOIN activity_refs ar ON ar.id = da.activity_ref_id \
     JOIN activity_ref_kinds ark ON ark.id = ar.activity_ref_kind_id \
     WHERE da.activity_application_id = aa.id AND ark.is_for_child) \
     THEN (SELECT COUNT(*) FROM time_interval_preferences tip WHERE tip.activity_application_id = aa.id) \
     ELSE (SELECT COUNT(*) FROM plannings p \
     JOIN time_slots ts ON ts.planning_id = p.id \
     JOIN time_intervals ti ON ti.id = ts.time_interval_id \
     WHERE p.user_id = aa.user_id AND NOT ti.is_validated \
     AND ti.start >= s.start AND ti.start <= s.\"end\") END)";

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ApplicationFilter) {
    match filter {
        ApplicationFilter::ActivityRefLabel(label) => {
            qb.push(
                " AND EXISTS (SELECT 1 FROM desired_activities da \
                 JOIN activity_refs ar ON ar.id = da.activity_ref_id \
                 WHERE da.activity_application_id = aa.id AND ar.label = ",
            );
            qb.push_bind(label.clone()).push(")");
        }
        ApplicationFilter::ActivityRefKindName(name) => {
            qb.push(
                " AND EXISTS (SELECT 1 FROM desired_activities da \
                 JOIN activity_refs ar ON ar.id = da.activity_ref_id \
                 JOIN activity_ref_kinds ark ON ark.id = ar.activity_ref_kind_id \
                 WHERE da.activity_application_id = aa.id AND ark.name = ",
            );
            qb.push_bind(name.clone()).push(")");
        }
        ApplicationFilter::StatusIds(ids) => {
            qb.push(" AND aa.activity_application_status_id = ANY(");
            qb.push_bind(ids.clone()).push(")");
        }
        ApplicationFilter::Id(id) => {
            qb.push(" AND aa.id = ").push_bind(*id);
        }
        ApplicationFilter::SeasonId(id) => {
            qb.push(" AND aa.season_id = ").push_bind(*id);
        }
        ApplicationFilter::Age(age) => {
            qb.push(" AND FLOOR(EXTRACT(YEAR FROM age(u.birthday)))::int = ")
                .push_bind(*age);
        }
        ApplicationFilter::AvailabilityCount(count) => {
            qb.push(" AND ")
                .push(AVAILABILITY_COUNT)
                .push(" = ")
                .push_bind(*count);
        }
        ApplicationFilter::Level(value) => {
            qb.push(" AND ").push(MIN_LEVEL).push(" = ").push_bind(*value);
        }
        ApplicationFilter::Actions(actions) => {
            let others: Vec<String> = actions.iter().filter(|a| *a != "new").cloned().collect();
            qb.push(
                " AND (EXISTS (SELECT 1 FROM pre_application_desired_activities pada \
                 WHERE pada.activity_application_id = aa.id AND pada.action = ANY(",
            );
            qb.push_bind(others.clone());
            qb.push(
                ")) OR EXISTS (SELECT 1 FROM pre_application_activities paa \
                 WHERE paa.activity_application_id = aa.id AND paa.action = ANY(",
            );
            qb.push_bind(others);
            qb.push("))");
            if actions.iter().any(|a| a == "new") {
                qb.push(
                    " OR EXISTS (SELECT 1 FROM pre_application_desired_activities pada \
                     WHERE pada.activity_application_id = aa.id AND pada.action = 'new') \
                     OR (NOT EXISTS (SELECT 1 FROM pre_application_desired_activities pada \
                     WHERE pada.activity_application_id = aa.id) \
                     AND NOT EXISTS (SELECT 1 FROM pre_application_activities paa \
                     WHERE paa.activity_application_id = aa.id))",
                );
            }
            qb.push(")");
        }
        ApplicationFilter::AdherentNumber(number) => {
            qb.push(" AND u.adherent_number = ").push_bind(*number);
        }
        ApplicationFilter::Referent(id) => {
            qb.push(" AND aa.referent_id = ").push_bind(*id);
        }
        ApplicationFilter::Name(name) => {
            qb.push(" AND translate(lower(u.first_name || ' ' || u.last_name), ");
            qb.push_bind(ACCENTED).push(", ").push_bind(PLAIN).push(") ILIKE ");
            qb.push_bind(format!("%{}%", fold_name(name.trim())));
        }
        ApplicationFilter::MailSent(true) => {
            qb.push(" AND aa.mail_sent_at IS NOT NULL");
        }
        ApplicationFilter::MailSent(false) => {
            qb.push(" AND aa.mail_sent_at IS NULL");
        }
    }
}

/// Appends ` WHERE ...` for the query's filters, scope and restrictions.
pub fn push_where(qb: &mut QueryBuilder<'_, Postgres>, query: &ApplicationQuery) {
    qb.push(" WHERE TRUE");
    for filter in &query.filters {
        push_filter(qb, filter);
    }
    if let Some(scope) = &query.scope {
        qb.push(" AND aa.season_id = ").push_bind(scope.season_id);
        qb.push(
            " AND EXISTS (SELECT 1 FROM desired_activities da \
             WHERE da.activity_application_id = aa.id AND da.activity_ref_id = ANY(",
        );
        qb.push_bind(scope.activity_ref_ids.clone()).push("))");
    }
    if let Some(ids) = &query.ids {
        qb.push(" AND aa.id = ANY(").push_bind(ids.clone()).push(")");
    }
    if let Some(status_ids) = &query.status_ids {
        qb.push(" AND aa.activity_application_status_id = ANY(")
            .push_bind(status_ids.clone())
            .push(")");
    }
    if let Some(season_id) = query.season_id {
        qb.push(" AND aa.season_id = ").push_bind(season_id);
    }
    if query.only_unsent_mail {
        qb.push(" AND aa.mail_sent_at IS NULL");
    }
}

/// Appends ` ORDER BY ...`; rows without an explicit sort come in id order
/// so pages stay stable.
pub fn push_order(qb: &mut QueryBuilder<'_, Postgres>, sort: Option<ApplicationSort>) {
    let Some(sort) = sort else {
        qb.push(" ORDER BY aa.id");
        return;
    };
    let dir = if sort.descending { "DESC" } else { "ASC" };
    // Older birthdays mean older students.
    let age_dir = if sort.descending { "ASC" } else { "DESC" };
    match sort.key {
        SortKey::Id => qb.push(format!(" ORDER BY aa.id {dir}")),
        SortKey::Name => qb.push(format!(" ORDER BY u.first_name || ' ' || u.last_name {dir}, aa.id")),
        SortKey::Date => qb.push(format!(" ORDER BY aa.created_at {dir}, aa.id")),
        SortKey::AdherentNumber => qb.push(format!(" ORDER BY u.adherent_number {dir} NULLS LAST, aa.id")),
        SortKey::Age => qb.push(format!(" ORDER BY u.birthday {age_dir} NULLS LAST, aa.id")),
        SortKey::Level => qb.push(format!(" ORDER BY {MIN_LEVEL} {dir} NULLS LAST, aa.id")),
        SortKey::Referent => qb.push(format!(" ORDER BY aa.referent_id {dir} NULLS LAST, aa.id")),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::applications::filter::TeacherScope;

    fn render(query: &ApplicationQuery) -> String {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT aa.id");
        qb.push(FROM_APPLICATIONS);
        push_where(&mut qb, query);
        push_order(&mut qb, query.sort);
        qb.sql().to_string()
    }

    #[test]
    fn binds_each_filter_value() {
        let query = ApplicationQuery {
            filters: vec![
                ApplicationFilter::StatusIds(vec![1, 2]),
                ApplicationFilter::Name("Éloïse".into()),
                ApplicationFilter::MailSent(false),
            ],
            ..Default::default()
        };
        let sql = render(&query);
        assert!(sql.contains("aa.activity_application_status_id = ANY($1)"));
        assert!(sql.contains(") ILIKE $4"));
        assert!(sql.contains("aa.mail_sent_at IS NULL"));
        assert!(sql.ends_with(" ORDER BY aa.id"));
    }

    #[test]
    fn new_action_also_matches_plain_applications() {
        let query = ApplicationQuery {
            filters: vec![ApplicationFilter::Actions(vec!["new".into(), "renew".into()])],
            ..Default::default()
        };
        let sql = render(&query);
        assert!(sql.contains("pada.action = 'new'"));
        assert!(sql.contains("NOT EXISTS (SELECT 1 FROM pre_application_activities"));
    }

    #[test]
    fn scope_and_sort_follow_the_filters() {
        let query = ApplicationQuery {
            scope: Some(TeacherScope {
                season_id: 3,
                activity_ref_ids: vec![5],
            }),
            sort: Some(ApplicationSort {
                key: SortKey::Age,
                descending: false,
            }),
            ..Default::default()
        };
        let sql = render(&query);
        assert!(sql.contains("aa.season_id = $1"));
        assert!(sql.contains("da.activity_ref_id = ANY($2)"));
        assert!(sql.contains("ORDER BY u.birthday DESC"));
    }

    #[test]
    fn folds_accents_and_dashes() {
        assert_eq!(fold_name("Jean-Noël"), "jean noel");
        assert_eq!(fold_name("ÇA"), "ca");
        assert_eq!(fold_name("D'Angelo"), "dangelo");
    }

    #[test]
    fn level_compares_the_evaluation_level_ref_id() {
        let query = ApplicationQuery {
            filters: vec![ApplicationFilter::Level(4)],
            sort: Some(ApplicationSort {
                key: SortKey::Level,
                descending: true,
            }),
            ..Default::default()
        };
        let sql = render(&query);
        assert!(sql.contains("(SELECT MIN(l.evaluation_level_ref_id) FROM levels l"));
        assert!(!sql.contains("evaluation_level_refs"));
        assert!(sql.contains("ORDER BY (SELECT MIN(l.evaluation_level_ref_id)"));
    }

    #[test]
    fn name_sort_uses_the_full_name() {
        let query = ApplicationQuery {
            sort: Some(ApplicationSort {
                key: SortKey::Name,
                descending: false,
            }),
            ..Default::default()
        };
        let sql = render(&query);
        assert!(sql.ends_with(" ORDER BY u.first_name || ' ' || u.last_name ASC, aa.id"));
    }
}
