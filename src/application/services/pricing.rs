use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::domain::catalog::activity_ref::ActivityRef;
use crate::domain::catalog::pricing::{
    MaxPrice, PackOffer, RefPricing, TARGET_ACTIVITY_REF, TARGET_ACTIVITY_REF_KIND,
};
use crate::domain::seasons::Season;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PricedActivityRef {
    #[serde(flatten)]
    pub activity_ref: ActivityRef,
    pub display_name: String,
    pub display_price: f64,
    pub display_prices_by_season: BTreeMap<i64, Option<f64>>,
}

/// Activity refs as the enrollment wizard lists them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WizardCatalog {
    pub activity_refs: Vec<PricedActivityRef>,
    pub activity_refs_childhood: Vec<PricedActivityRef>,
    pub activity_refs_cham: Vec<PricedActivityRef>,
}

pub struct CatalogPricer<'a> {
    pub max_prices: &'a [MaxPrice],
    pub default_pricings: &'a [RefPricing],
    pub seasons: &'a [Season],
    pub season_id: i64,
}

impl<'a> CatalogPricer<'a> {
    fn max_price_for(&self, target_type: &str, target_id: i64, season_id: i64) -> Option<f64> {
        self.max_prices
            .iter()
            .find(|mp| {
                mp.target_type == target_type
                    && mp.target_id == target_id
                    && mp.season_id == season_id
            })
            .map(|mp| mp.price)
    }

    /// Substitutable refs are priced as their whole kind.
    fn target_of(activity_ref: &ActivityRef) -> Option<(&'static str, i64)> {
        if activity_ref.substitutable {
            activity_ref
                .activity_ref_kind_id
                .map(|kind_id| (TARGET_ACTIVITY_REF_KIND, kind_id))
        } else {
            Some((TARGET_ACTIVITY_REF, activity_ref.id))
        }
    }

    fn target_price(&self, activity_ref: &ActivityRef, season_id: i64) -> Option<f64> {
        Self::target_of(activity_ref)
            .and_then(|(target_type, target_id)| self.max_price_for(target_type, target_id, season_id))
    }

    fn priced(&self, activity_ref: ActivityRef) -> PricedActivityRef {
        let display_price = self.target_price(&activity_ref, self.season_id).unwrap_or(0.0);
        let display_prices_by_season = self
            .seasons
            .iter()
            .map(|s| (s.id, self.target_price(&activity_ref, s.id)))
            .collect();
        PricedActivityRef {
            display_name: activity_ref.display_name().to_string(),
            activity_ref,
            display_price,
            display_prices_by_season,
        }
    }

    /// Highest valid price of a kind's default ref, per season id.
    fn default_ref_price(&self, activity_ref_id: i64, season: &Season) -> f64 {
        self.default_pricings
            .iter()
            .filter(|p| p.activity_ref_id == activity_ref_id && p.applies_to_season_starting(season.start))
            .map(|p| p.price)
            .fold(None, |acc: Option<f64>, price| Some(acc.map_or(price, |a| a.max(price))))
            .unwrap_or(0.0)
    }

    fn reprice_as_default(&self, selected: &mut PricedActivityRef, default_id: i64) {
        selected.display_price = self
            .seasons
            .iter()
            .find(|s| s.id == self.season_id)
            .map(|s| self.default_ref_price(default_id, s))
            .unwrap_or(0.0);
        selected.display_prices_by_season = self
            .seasons
            .iter()
            .map(|s| (s.id, Some(self.default_ref_price(default_id, s))))
            .collect();
    }

    pub fn build(&self, refs: Vec<ActivityRef>, is_admin: bool) -> WizardCatalog {
        let visible = refs
            .into_iter()
            .filter(|r| r.is_lesson || r.is_visible_to_admin)
            .filter(|r| is_admin || !r.is_visible_to_admin)
            .map(|r| self.priced(r));

        let mut by_kind: Vec<(String, Vec<PricedActivityRef>)> = Vec::new();
        let mut standalone = Vec::new();
        let mut catalog = WizardCatalog::default();
        for priced in visible {
            let r = &priced.activity_ref;
            if r.is_childhood() {
                catalog.activity_refs_childhood.push(priced);
            } else if r.is_cham() {
                catalog.activity_refs_cham.push(priced);
            } else if r.substitutable {
                match by_kind.iter_mut().find(|(kind, _)| *kind == r.kind) {
                    Some((_, group)) => group.push(priced),
                    None => by_kind.push((r.kind.clone(), vec![priced])),
                }
            } else {
                standalone.push(priced);
            }
        }

        for (_, group) in by_kind {
            let default_id = group
                .first()
                .and_then(|p| p.activity_ref.default_activity_ref_id());
            let default_pos =
                default_id.and_then(|id| group.iter().position(|p| p.activity_ref.id == id));
            let selected = match (default_pos, default_id) {
                (Some(pos), Some(id)) => {
                    let mut selected = group[pos].clone();
                    self.reprice_as_default(&mut selected, id);
                    Some(selected)
                }
                _ => group
                    .into_iter()
                    .reduce(|best, p| if p.display_price > best.display_price { p } else { best }),
            };
            catalog.activity_refs.extend(selected);
        }
        catalog.activity_refs.extend(standalone);
        catalog
            .activity_refs
            .sort_by(|a, b| a.activity_ref.kind.cmp(&b.activity_ref.kind));
        catalog
    }
}

/// Pack offers grouped by activity label; labels without offers are dropped.
pub fn group_packs(offers: Vec<PackOffer>) -> BTreeMap<String, Vec<PackOffer>> {
    let mut grouped: HashMap<String, Vec<PackOffer>> = HashMap::new();
    for offer in offers {
        grouped
            .entry(offer.activity_ref_label.clone())
            .or_default()
            .push(offer);
    }
    grouped.into_iter().filter(|(_, v)| !v.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::activity_ref::ActivityRefKind;
    use chrono::{TimeZone, Utc};

    fn season(id: i64, year: i32) -> Season {
        Season {
            id,
            label: format!("{year}-{}", year + 1),
            start: Utc.with_ymd_and_hms(year, 9, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(year + 1, 6, 30, 0, 0, 0).unwrap(),
            opening_date_for_applications: None,
        }
    }

    fn aref(id: i64, kind: &str, kind_id: i64, substitutable: bool) -> ActivityRef {
        ActivityRef {
            id,
            label: format!("ref {id}"),
            kind: kind.into(),
            activity_ref_kind_id: Some(kind_id),
            activity_type: None,
            is_lesson: true,
            is_visible_to_admin: false,
            substitutable,
            activity_ref_kind: Some(ActivityRefKind {
                id: kind_id,
                name: kind.into(),
                is_for_child: false,
                default_activity_ref_id: None,
            }),
        }
    }

    fn max(target_type: &str, target_id: i64, season_id: i64, price: f64) -> MaxPrice {
        MaxPrice {
            target_type: target_type.into(),
            target_id,
            season_id,
            price,
        }
    }

    #[test]
    fn keeps_the_most_expensive_ref_per_kind() {
        let seasons = vec![season(1, 2025)];
        let max_prices = vec![
            max(TARGET_ACTIVITY_REF_KIND, 10, 1, 300.0),
            max(TARGET_ACTIVITY_REF, 3, 1, 120.0),
        ];
        let pricer = CatalogPricer {
            max_prices: &max_prices,
            default_pricings: &[],
            seasons: &seasons,
            season_id: 1,
        };
        let refs = vec![
            aref(1, "Piano", 10, true),
            aref(2, "Piano", 10, true),
            aref(3, "Chorale", 20, false),
        ];
        let catalog = pricer.build(refs, false);
        assert_eq!(catalog.activity_refs.len(), 2);
        assert_eq!(catalog.activity_refs[0].activity_ref.kind, "Chorale");
        assert_eq!(catalog.activity_refs[0].display_price, 120.0);
        assert_eq!(catalog.activity_refs[1].display_price, 300.0);
        assert_eq!(
            catalog.activity_refs[1].display_prices_by_season.get(&1),
            Some(&Some(300.0))
        );
    }

    #[test]
    fn default_ref_uses_its_own_pricings() {
        let seasons = vec![season(1, 2025), season(2, 2026)];
        let mut first = aref(1, "Guitare", 10, true);
        let mut second = aref(2, "Guitare", 10, true);
        for r in [&mut first, &mut second] {
            if let Some(kind) = r.activity_ref_kind.as_mut() {
                kind.default_activity_ref_id = Some(2);
            }
        }
        let pricings = vec![
            RefPricing {
                activity_ref_id: 2,
                price: 90.0,
                from_season_start: seasons[0].start,
                to_season_end: None,
            },
            RefPricing {
                activity_ref_id: 2,
                price: 110.0,
                from_season_start: seasons[0].start,
                to_season_end: Some(seasons[0].end),
            },
        ];
        let pricer = CatalogPricer {
            max_prices: &[],
            default_pricings: &pricings,
            seasons: &seasons,
            season_id: 1,
        };
        let catalog = pricer.build(vec![first, second], false);
        assert_eq!(catalog.activity_refs.len(), 1);
        let shown = &catalog.activity_refs[0];
        assert_eq!(shown.activity_ref.id, 2);
        assert_eq!(shown.display_price, 110.0);
        assert_eq!(shown.display_prices_by_season.get(&2), Some(&Some(90.0)));
    }

    #[test]
    fn admin_only_refs_are_hidden_from_families() {
        let seasons = vec![season(1, 2025)];
        let pricer = CatalogPricer {
            max_prices: &[],
            default_pricings: &[],
            seasons: &seasons,
            season_id: 1,
        };
        let mut hidden = aref(5, "Atelier", 30, false);
        hidden.is_lesson = false;
        hidden.is_visible_to_admin = true;
        let mut child = aref(6, "Eveil", 40, false);
        child.activity_type = Some("child".into());

        let family = pricer.build(vec![hidden.clone(), child.clone()], false);
        assert!(family.activity_refs.is_empty());
        assert_eq!(family.activity_refs_childhood.len(), 1);
        assert_eq!(family.activity_refs_childhood[0].display_price, 0.0);

        let admin = pricer.build(vec![hidden, child], true);
        assert_eq!(admin.activity_refs.len(), 1);
    }

    #[test]
    fn packs_are_grouped_by_label() {
        let offer = |id, label: &str| PackOffer {
            id,
            activity_ref_id: id,
            activity_ref_label: label.into(),
            price: 50.0,
            pricing_category_id: 1,
            pricing_category_name: "Pack 5".into(),
            number_lessons: Some(5),
        };
        let grouped = group_packs(vec![offer(1, "Piano"), offer(2, "Piano"), offer(3, "Violon")]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["Piano"].len(), 2);
    }
}
