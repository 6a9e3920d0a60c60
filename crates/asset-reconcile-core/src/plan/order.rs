//! Dependency ordering for path transfers.
//!
//! A transfer may only run once nothing else still has to leave its
//! destination. When every remaining transfer waits on another one, the
//! rest form cycles and one source is parked under a staging name first.
//! Paths compare case-insensitively.

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer<T> {
    pub from: String,
    pub to: String,
    pub payload: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    Transfer(Transfer<T>),
    /// Park `from` at `to`; the transfer carrying `payload` continues from
    /// there later.
    Stage { from: String, to: String, payload: T },
}

pub fn order_transfers<T, F>(transfers: Vec<Transfer<T>>, mut staging_name: F) -> Vec<Step<T>>
where
    T: Clone,
    F: FnMut(&str, usize) -> String,
{
    let mut pending: BTreeMap<(String, String), Transfer<T>> = BTreeMap::new();
    let mut sources: HashMap<String, usize> = HashMap::new();
    for transfer in transfers {
        let lower = transfer.from.to_lowercase();
        *sources.entry(lower.clone()).or_insert(0) += 1;
        pending.insert((lower, transfer.from.clone()), transfer);
    }

    let mut steps = Vec::with_capacity(pending.len());
    let mut staged = 0;
    while !pending.is_empty() {
        let ready: Vec<(String, String)> = pending
            .iter()
            .filter(|(key, transfer)| !is_blocked(&sources, &key.0, transfer))
            .map(|(key, _)| key.clone())
            .collect();

        if ready.is_empty() {
            let Some(key) = pending.keys().next().cloned() else {
                break;
            };
            let Some(mut transfer) = pending.remove(&key) else {
                break;
            };
            release(&mut sources, &key.0);
            staged += 1;
            let parked = staging_name(&transfer.from, staged);
            steps.push(Step::Stage {
                from: transfer.from.clone(),
                to: parked.clone(),
                payload: transfer.payload.clone(),
            });
            transfer.from = parked;
            let lower = transfer.from.to_lowercase();
            *sources.entry(lower.clone()).or_insert(0) += 1;
            pending.insert((lower, transfer.from.clone()), transfer);
            continue;
        }

        for key in ready {
            if let Some(transfer) = pending.remove(&key) {
                release(&mut sources, &key.0);
                steps.push(Step::Transfer(transfer));
            }
        }
    }
    steps
}

fn is_blocked<T>(sources: &HashMap<String, usize>, own_source: &str, transfer: &Transfer<T>) -> bool {
    let destination = transfer.to.to_lowercase();
    let waiting = sources.get(&destination).copied().unwrap_or(0);
    // A case-only rename only waits on itself.
    let own = usize::from(destination == own_source);
    waiting > own
}

fn release(sources: &mut HashMap<String, usize>, source: &str) {
    if let Some(count) = sources.get_mut(source) {
        *count -= 1;
        if *count == 0 {
            sources.remove(source);
        }
    }
}
