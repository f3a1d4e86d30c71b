use std::collections::{BTreeMap, HashMap};

use crate::models::{Evidence, SignalType};

/// Identity of a signal: at most one active row exists per key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalKey {
    pub market_id: String,
    pub signal_type: SignalType,
}

impl SignalKey {
    pub fn new(market_id: impl Into<String>, signal_type: SignalType) -> Self {
        Self {
            market_id: market_id.into(),
            signal_type,
        }
    }
}

impl From<&Evidence> for SignalKey {
    fn from(evidence: &Evidence) -> Self {
        SignalKey::new(evidence.market_id.clone(), evidence.signal_type)
    }
}

/// State change for one key in a detection cycle.
///
/// absent/resolved --detected--> active (Open)
/// active --detected--> active (Refresh, same row)
/// active --not detected--> resolved (Resolve)
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<'a> {
    Open { evidence: &'a Evidence },
    Refresh { id: i64, evidence: &'a Evidence },
    Resolve { id: i64, key: SignalKey },
}

/// Ordered set of transitions for one detection cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan<'a> {
    pub transitions: Vec<Transition<'a>>,
}

impl ReconcilePlan<'_> {
    pub fn opened(&self) -> usize {
        self.count(|t| matches!(t, Transition::Open { .. }))
    }

    pub fn refreshed(&self) -> usize {
        self.count(|t| matches!(t, Transition::Refresh { .. }))
    }

    pub fn resolved(&self) -> usize {
        self.count(|t| matches!(t, Transition::Resolve { .. }))
    }

    fn count(&self, f: impl Fn(&Transition<'_>) -> bool) -> usize {
        self.transitions.iter().filter(|t| f(t)).count()
    }
}

/// Reconcile this cycle's evidence against the currently active signals.
///
/// `active` maps each active key to its row id. Only active signals whose type
/// is in `evaluated` can be resolved, so each signal type's lifecycle is
/// independent of the others. Repeated evidence for one key keeps the last.
pub fn plan_reconciliation<'a>(
    active: &HashMap<SignalKey, i64>,
    detected: &'a [Evidence],
    evaluated: &[SignalType],
) -> ReconcilePlan<'a> {
    let detected_by_key: BTreeMap<SignalKey, &Evidence> =
        detected.iter().map(|e| (SignalKey::from(e), e)).collect();

    let mut transitions = Vec::with_capacity(detected_by_key.len());

    for (key, &evidence) in &detected_by_key {
        match active.get(key) {
            Some(&id) => transitions.push(Transition::Refresh { id, evidence }),
            None => transitions.push(Transition::Open { evidence }),
        }
    }

    let mut stale: Vec<(&SignalKey, i64)> = active
        .iter()
        .filter(|(key, _)| evaluated.contains(&key.signal_type))
        .filter(|(key, _)| !detected_by_key.contains_key(*key))
        .map(|(key, id)| (key, *id))
        .collect();
    stale.sort();

    transitions.extend(stale.into_iter().map(|(key, id)| Transition::Resolve {
        id,
        key: key.clone(),
    }));

    ReconcilePlan { transitions }
}
