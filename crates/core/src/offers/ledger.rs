use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::offer::{MemberKey, Offer, OfferId, OfferStatus};
use crate::domain::request::RequestStatus;
use crate::errors::ErrorKind;

/// Result of the PM-evaluation readiness check, with the members still lacking a selection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub ready: bool,
    pub has_selection: bool,
    pub missing: Vec<MemberKey>,
}

/// Every member with a real offer needs a selection, and at least one selection must exist.
/// Members whose only offers are placeholders are exempt.
pub fn readiness(offers: &[Offer]) -> Readiness {
    let available: BTreeSet<MemberKey> =
        offers.iter().filter(|offer| !offer.is_placeholder()).map(Offer::member_key).collect();
    let selected: BTreeSet<MemberKey> = offers
        .iter()
        .filter(|offer| offer.is_selected() && !offer.is_placeholder())
        .map(Offer::member_key)
        .collect();

    let missing: Vec<MemberKey> = available.difference(&selected).cloned().collect();
    let has_selection = !selected.is_empty();

    Readiness { ready: has_selection && missing.is_empty(), has_selection, missing }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("offer `{offer_id}` does not belong to this request")]
    OfferNotFound { offer_id: String },
    #[error("offer `{offer_id}` is a no-provider placeholder and cannot be selected")]
    Placeholder { offer_id: String },
    #[error("offers cannot be changed while the request is {status}")]
    SelectionClosed { status: RequestStatus },
}

impl SelectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OfferNotFound { .. } => ErrorKind::NotFound,
            Self::Placeholder { .. } | Self::SelectionClosed { .. } => ErrorKind::IllegalState,
        }
    }
}

/// Offers whose status flipped during one toggle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionChange {
    pub offer: Offer,
    pub deselected: Vec<Offer>,
}

impl SelectionChange {
    pub fn changed(&self) -> Vec<Offer> {
        std::iter::once(self.offer.clone()).chain(self.deselected.iter().cloned()).collect()
    }
}

#[derive(Clone, Debug, Default)]
pub struct OfferSelectionLedger {
    offers: Vec<Offer>,
}

impl OfferSelectionLedger {
    pub fn new(offers: Vec<Offer>) -> Self {
        Self { offers }
    }

    pub fn offers(&self) -> &[Offer] {
        &self.offers
    }

    pub fn into_offers(self) -> Vec<Offer> {
        self.offers
    }

    /// Flips the offer's status. Selecting also clears any other selection sharing its
    /// domain, role, level and cycle.
    pub fn toggle(&mut self, offer_id: &OfferId) -> Result<SelectionChange, SelectionError> {
        let index = self
            .offers
            .iter()
            .position(|offer| &offer.id == offer_id)
            .ok_or_else(|| SelectionError::OfferNotFound { offer_id: offer_id.to_string() })?;

        if self.offers[index].is_placeholder() {
            return Err(SelectionError::Placeholder { offer_id: offer_id.to_string() });
        }

        if self.offers[index].is_selected() {
            self.offers[index].status = OfferStatus::Unselected;
            let offer = self.offers[index].clone();
            return Ok(SelectionChange { offer, deselected: Vec::new() });
        }

        let key = self.offers[index].selection_key();
        let mut deselected = Vec::new();
        for (position, offer) in self.offers.iter_mut().enumerate() {
            if position != index && offer.is_selected() && offer.selection_key() == key {
                offer.status = OfferStatus::Unselected;
                deselected.push(offer.clone());
            }
        }
        self.offers[index].status = OfferStatus::Selected;

        Ok(SelectionChange { offer: self.offers[index].clone(), deselected })
    }

    pub fn readiness(&self) -> Readiness {
        readiness(&self.offers)
    }

    pub fn is_ready_for_pm_evaluation(&self) -> bool {
        self.readiness().ready
    }

    pub fn selected(&self) -> Vec<Offer> {
        self.offers.iter().filter(|offer| offer.is_selected()).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use super::{readiness, OfferSelectionLedger, SelectionError};
    use crate::domain::offer::{MemberKey, Offer, OfferId, OfferStatus};
    use crate::domain::request::{CycleStatus, ServiceRequestId};

    fn offer(id: &str, role: &str, provider: Option<&str>, cycle: u32) -> Offer {
        Offer {
            id: OfferId(id.to_string()),
            service_request_id: ServiceRequestId("SR-1".to_string()),
            domain_id: "D-1".to_string(),
            role: role.to_string(),
            level: "Senior".to_string(),
            technology_level: "Advanced".to_string(),
            provider_name: provider.map(str::to_string),
            price: Decimal::new(100, 0),
            cycle: CycleStatus::new(cycle).expect("cycle >= 1"),
            employee_profiles: Vec::new(),
            status: OfferStatus::Unselected,
            created_at: Utc::now(),
        }
    }

    fn status_of(ledger: &OfferSelectionLedger, id: &str) -> OfferStatus {
        ledger
            .offers()
            .iter()
            .find(|offer| offer.id.0 == id)
            .map(|offer| offer.status)
            .expect("offer exists")
    }

    #[test]
    fn toggle_twice_restores_unselected() {
        let mut ledger = OfferSelectionLedger::new(vec![offer("A", "Dev", Some("Acme"), 1)]);
        let id = OfferId("A".to_string());

        ledger.toggle(&id).expect("select");
        assert_eq!(status_of(&ledger, "A"), OfferStatus::Selected);
        let change = ledger.toggle(&id).expect("deselect");
        assert_eq!(change.offer.status, OfferStatus::Unselected);
        assert!(change.deselected.is_empty());
    }

    #[test]
    fn selecting_a_sibling_replaces_the_previous_selection() {
        let mut ledger = OfferSelectionLedger::new(vec![
            offer("A", "Dev", Some("Acme"), 1),
            offer("B", "Dev", Some("Globex"), 1),
            offer("C", "Dev", Some("Initech"), 2),
        ]);

        ledger.toggle(&OfferId("A".to_string())).expect("select A");
        ledger.toggle(&OfferId("C".to_string())).expect("select C in another cycle");
        let change = ledger.toggle(&OfferId("B".to_string())).expect("select B");

        assert_eq!(change.deselected.len(), 1);
        assert_eq!(change.deselected[0].id.0, "A");
        assert_eq!(change.changed().len(), 2);
        assert_eq!(status_of(&ledger, "A"), OfferStatus::Unselected);
        assert_eq!(status_of(&ledger, "B"), OfferStatus::Selected);
        assert_eq!(status_of(&ledger, "C"), OfferStatus::Selected);
    }

    #[test]
    fn placeholders_and_unknown_offers_are_rejected() {
        let mut ledger = OfferSelectionLedger::new(vec![offer("P", "Dev", None, 1)]);

        assert!(matches!(
            ledger.toggle(&OfferId("P".to_string())),
            Err(SelectionError::Placeholder { .. })
        ));
        assert!(matches!(
            ledger.toggle(&OfferId("missing".to_string())),
            Err(SelectionError::OfferNotFound { .. })
        ));
        assert_eq!(status_of(&ledger, "P"), OfferStatus::Unselected);
    }

    #[test]
    fn readiness_exempts_members_without_real_offers() {
        let mut ledger = OfferSelectionLedger::new(vec![
            offer("A", "Dev", Some("Acme"), 1),
            offer("P", "QA", None, 1),
        ]);
        assert!(!ledger.is_ready_for_pm_evaluation());
        assert!(!ledger.readiness().has_selection);

        ledger.toggle(&OfferId("A".to_string())).expect("select A");
        assert!(ledger.is_ready_for_pm_evaluation());
        assert_eq!(ledger.selected().len(), 1);
    }

    #[test]
    fn readiness_names_members_without_selection() {
        let mut offers =
            vec![offer("A", "Dev", Some("Acme"), 1), offer("B", "QA", Some("Globex"), 1)];
        offers[0].status = OfferStatus::Selected;

        let report = readiness(&offers);
        assert!(!report.ready);
        assert!(report.has_selection);
        assert_eq!(
            report.missing,
            vec![MemberKey { domain_id: "D-1".to_string(), role: "QA".to_string() }]
        );
    }

    #[test]
    fn only_placeholders_is_never_ready() {
        assert!(!readiness(&[offer("P", "Dev", None, 1)]).ready);
        assert!(!readiness(&[]).ready);
    }

    fn pool() -> Vec<Offer> {
        vec![
            offer("A1", "Dev", Some("Acme"), 1),
            offer("A2", "Dev", Some("Globex"), 1),
            offer("A3", "Dev", Some("Initech"), 2),
            offer("B1", "QA", Some("Acme"), 1),
            offer("B2", "QA", Some("Hooli"), 1),
            offer("P1", "Ops", None, 1),
        ]
    }

    proptest! {
        #[test]
        fn at_most_one_selection_per_slot_and_cycle(
            picks in proptest::collection::vec(0usize..6, 0..40),
        ) {
            let ids: Vec<OfferId> = pool().into_iter().map(|offer| offer.id).collect();
            let mut ledger = OfferSelectionLedger::new(pool());
            for pick in picks {
                let _ = ledger.toggle(&ids[pick]);

                let mut per_key = HashMap::new();
                for offer in ledger.offers().iter().filter(|offer| offer.is_selected()) {
                    *per_key.entry(offer.selection_key()).or_insert(0u32) += 1;
                }
                prop_assert!(per_key.values().all(|count| *count <= 1));
                prop_assert!(ledger
                    .offers()
                    .iter()
                    .all(|offer| !(offer.is_placeholder() && offer.is_selected())));
            }
        }

        #[test]
        fn removing_a_selection_from_a_ready_set_breaks_readiness(
            picks in proptest::collection::vec(0usize..5, 0..20),
        ) {
            let ids: Vec<OfferId> = pool().into_iter().map(|offer| offer.id).collect();
            let mut ledger = OfferSelectionLedger::new(pool());
            for pick in picks {
                let _ = ledger.toggle(&ids[pick]);
            }

            if ledger.is_ready_for_pm_evaluation() {
                let selected = ledger.selected();
                // A member selected in two cycles stays covered after one of them is removed.
                let lone = selected.iter().find(|offer| {
                    let key = offer.member_key();
                    selected.iter().filter(|other| other.member_key() == key).count() == 1
                });
                if let Some(lone) = lone {
                    let mut reduced = ledger.clone();
                    reduced.toggle(&lone.id).expect("deselect");
                    prop_assert!(!reduced.is_ready_for_pm_evaluation());
                }
            }
        }
    }
}
