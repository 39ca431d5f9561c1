use chrono::{Datelike, NaiveDate, Weekday};

use crate::application::dto::applications::{ExportRecord, Telephone};

pub const HEADER: [&str; 18] = [
    "N° demande",
    "Activité.s",
    "Niveau",
    "Action",
    "Statut",
    "Saison",
    "N° adhérent de l'élève",
    "Nom de l'élève",
    "Prénom de l'élève",
    "Âge de l'élève",
    "Adresse mail de l'élève",
    "Adresse postale de l'élève",
    "N° de téléphone de l'élève",
    "Prénom du responsable légal",
    "Nom du responsable légal",
    "N° de téléphone du responsable légal",
    "Disponibilités",
    "Commentaires",
];

const UNKNOWN: &str = "?";

fn day_abbr(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "lun",
        Weekday::Tue => "mar",
        Weekday::Wed => "mer",
        Weekday::Thu => "jeu",
        Weekday::Fri => "ven",
        Weekday::Sat => "sam",
        Weekday::Sun => "dim",
    }
}

pub fn age_on(birthday: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birthday.year();
    if (today.month(), today.day()) < (birthday.month(), birthday.day()) {
        age -= 1;
    }
    age
}

/// Mobile number first, then whatever was entered first.
pub fn preferred_phone(telephones: &[Telephone]) -> Option<&str> {
    telephones
        .iter()
        .find(|t| t.label.as_deref() == Some("portable"))
        .or_else(|| telephones.first())
        .map(|t| t.number.as_str())
}

pub fn action_label(record: &ExportRecord) -> &'static str {
    if let Some(desired) = &record.pre_application_desired_activity {
        return if desired.action.as_deref() == Some("change") {
            "Changement"
        } else {
            "Nouvelle demande"
        };
    }
    match &record.pre_application_activity {
        Some(pre) if pre.action.as_deref() == Some("renew") => "Renouvellement",
        Some(_) => "Changement",
        None => "Nouvelle demande",
    }
}

fn levels_cell(record: &ExportRecord) -> String {
    let levels: Vec<String> = record
        .levels
        .iter()
        .filter(|l| {
            l.season_id == record.season_id
                && record.activity_refs.iter().any(|r| r.id == l.activity_ref_id)
        })
        .map(|l| {
            format!(
                "{} ({})",
                l.level_label.as_deref().unwrap_or(UNKNOWN),
                l.activity_label.as_deref().unwrap_or(UNKNOWN)
            )
        })
        .collect();
    if levels.is_empty() {
        UNKNOWN.to_string()
    } else {
        levels.join(", ")
    }
}

fn address_cell(record: &ExportRecord) -> String {
    match &record.address {
        Some(a) => format!(
            "{} {} {}",
            a.street_address.as_deref().unwrap_or_default(),
            a.postcode.as_deref().unwrap_or_default(),
            a.city.as_deref().unwrap_or_default().to_uppercase()
        ),
        None => UNKNOWN.to_string(),
    }
}

fn availabilities_cell(record: &ExportRecord) -> String {
    record
        .availabilities
        .iter()
        .map(|a| {
            format!(
                "{} {} ➝ {}",
                day_abbr(a.start.weekday()),
                a.start.format("%H:%M"),
                a.end.format("%H:%M")
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn comments_cell(record: &ExportRecord) -> String {
    record
        .comments
        .iter()
        .map(|c| {
            format!(
                "« {} » (de {} {})",
                c.content,
                c.author_first_name.as_deref().unwrap_or_default(),
                c.author_last_name.as_deref().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn row(record: &ExportRecord, today: NaiveDate) -> Vec<String> {
    let activities = record
        .activity_refs
        .iter()
        .map(|r| r.label.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let referent = record.legal_referent.as_ref();
    vec![
        record.id.to_string(),
        activities,
        levels_cell(record),
        action_label(record).to_string(),
        record.status_label.clone().unwrap_or_else(|| UNKNOWN.into()),
        record.season_label.clone().unwrap_or_else(|| UNKNOWN.into()),
        record
            .adherent_number
            .map(|n| n.to_string())
            .unwrap_or_default(),
        record.last_name.clone(),
        record.first_name.clone(),
        record
            .birthday
            .map(|b| age_on(b, today).to_string())
            .unwrap_or_else(|| UNKNOWN.into()),
        record.email.clone().unwrap_or_default(),
        address_cell(record),
        preferred_phone(&record.telephones)
            .unwrap_or(UNKNOWN)
            .to_string(),
        referent.map(|r| r.first_name.clone()).unwrap_or_default(),
        referent.map(|r| r.last_name.clone()).unwrap_or_default(),
        referent
            .and_then(|r| preferred_phone(&r.telephones))
            .unwrap_or(UNKNOWN)
            .to_string(),
        availabilities_cell(record),
        comments_cell(record),
    ]
}

/// `;`-separated export written batch by batch into memory.
pub struct CsvExport {
    writer: csv::Writer<Vec<u8>>,
    today: NaiveDate,
}

impl CsvExport {
    pub fn start(today: NaiveDate) -> anyhow::Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_writer(Vec::new());
        writer.write_record(HEADER)?;
        Ok(Self { writer, today })
    }

    pub fn push(&mut self, record: &ExportRecord) -> anyhow::Result<()> {
        self.writer.write_record(row(record, self.today))?;
        Ok(())
    }

    pub fn finish(self) -> anyhow::Result<Vec<u8>> {
        self.writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("csv_flush_failed: {}", e.error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dto::applications::{
        ActionOnly, ActivityRefBrief, Availability, ExportComment, ExportContact, ExportLevel,
        PostalAddress,
    };
    use chrono::{TimeZone, Utc};

    fn record() -> ExportRecord {
        ExportRecord {
            id: 42,
            season_id: 3,
            activity_refs: vec![
                ActivityRefBrief {
                    id: 1,
                    label: "Piano".into(),
                    kind: "Piano".into(),
                },
                ActivityRefBrief {
                    id: 2,
                    label: "Solfège".into(),
                    kind: "FM".into(),
                },
            ],
            levels: vec![
                ExportLevel {
                    season_id: 3,
                    activity_ref_id: 1,
                    activity_label: Some("Piano".into()),
                    level_label: Some("Débutant".into()),
                },
                ExportLevel {
                    season_id: 2,
                    activity_ref_id: 2,
                    activity_label: Some("Solfège".into()),
                    level_label: Some("Cycle 1".into()),
                },
            ],
            pre_application_desired_activity: None,
            pre_application_activity: Some(ActionOnly {
                action: Some("renew".into()),
            }),
            status_label: Some("En attente de traitement".into()),
            season_label: None,
            adherent_number: Some(1234),
            first_name: "Alice".into(),
            last_name: "Martin".into(),
            birthday: NaiveDate::from_ymd_opt(2012, 10, 20),
            email: Some("alice@example.org".into()),
            address: Some(PostalAddress {
                street_address: Some("3 rue des Lilas".into()),
                postcode: Some("75011".into()),
                city: Some("Paris".into()),
            }),
            telephones: vec![
                Telephone {
                    number: "0102030405".into(),
                    label: Some("fixe".into()),
                },
                Telephone {
                    number: "0605040302".into(),
                    label: Some("portable".into()),
                },
            ],
            legal_referent: Some(ExportContact {
                first_name: "Bob".into(),
                last_name: "Martin".into(),
                telephones: vec![],
            }),
            availabilities: vec![Availability {
                id: 9,
                // Monday
                start: Utc.with_ymd_and_hms(2025, 9, 15, 17, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2025, 9, 15, 18, 30, 0).unwrap(),
            }],
            comments: vec![ExportComment {
                content: "Préfère le soir".into(),
                author_first_name: Some("Claire".into()),
                author_last_name: Some("Dupont".into()),
            }],
        }
    }

    #[test]
    fn formats_a_full_row() {
        let today = NaiveDate::from_ymd_opt(2025, 10, 17).unwrap();
        let cells = row(&record(), today);
        assert_eq!(cells.len(), HEADER.len());
        assert_eq!(cells[0], "42");
        assert_eq!(cells[1], "Piano, Solfège");
        assert_eq!(cells[2], "Débutant (Piano)");
        assert_eq!(cells[3], "Renouvellement");
        assert_eq!(cells[5], "?");
        assert_eq!(cells[9], "12");
        assert_eq!(cells[11], "3 rue des Lilas 75011 PARIS");
        assert_eq!(cells[12], "0605040302");
        assert_eq!(cells[13], "Bob");
        assert_eq!(cells[15], "?");
        assert_eq!(cells[16], "lun 17:00 ➝ 18:30");
        assert_eq!(cells[17], "« Préfère le soir » (de Claire Dupont)");
    }

    #[test]
    fn desired_action_wins_over_pre_application() {
        let mut r = record();
        r.pre_application_desired_activity = Some(ActionOnly {
            action: Some("new".into()),
        });
        assert_eq!(action_label(&r), "Nouvelle demande");
        r.pre_application_desired_activity = Some(ActionOnly {
            action: Some("change".into()),
        });
        assert_eq!(action_label(&r), "Changement");
        r.pre_application_desired_activity = None;
        r.pre_application_activity = Some(ActionOnly {
            action: Some("stop".into()),
        });
        assert_eq!(action_label(&r), "Changement");
        r.pre_application_activity = None;
        assert_eq!(action_label(&r), "Nouvelle demande");
    }

    #[test]
    fn missing_data_falls_back_to_question_marks() {
        let mut r = record();
        r.levels.clear();
        r.address = None;
        r.telephones.clear();
        r.birthday = None;
        let cells = row(&r, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(cells[2], "?");
        assert_eq!(cells[9], "?");
        assert_eq!(cells[11], "?");
        assert_eq!(cells[12], "?");
    }

    #[test]
    fn writes_semicolon_separated_output() {
        let mut export = CsvExport::start(NaiveDate::from_ymd_opt(2025, 10, 17).unwrap()).unwrap();
        export.push(&record()).unwrap();
        let bytes = export.finish().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("N° demande;Activité.s;Niveau"));
        assert!(lines.next().unwrap().starts_with("42;Piano, Solfège;Débutant (Piano);"));
    }
}
