//! Aircraft profiles: one simulator add-on mapped onto one hardware family.
//!
//! Each device family keeps an ordered registry of [`ProfileEntry`]s. On
//! attach the first entry whose eligibility check passes is instantiated.

pub mod cdu;
pub mod fcu;
pub mod pap3;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::datarefs::{DatarefStore, DatarefType, MonitorId};

/// Eligibility predicate plus constructor for one profile class.
///
/// `A` is whatever the constructor needs from the attached hardware (the CDU
/// variant, for instance).
pub struct ProfileEntry<P: ?Sized, A = ()> {
    pub name:     &'static str,
    pub eligible: fn(&DatarefStore) -> bool,
    pub create:   fn(A) -> Box<P>,
}

/// First eligible profile in registry order.
pub fn detect<P: ?Sized, A: Copy>(
    entries: &[ProfileEntry<P, A>],
    store: &DatarefStore,
    arg: A,
) -> Option<Box<P>> {
    let names = eligible_names(entries, store);
    if names.len() > 1 {
        warn!(candidates = ?names, "several profiles eligible, using the first");
    }
    let first = names.first()?;
    let entry = entries.iter().find(|e| e.name == *first)?;
    info!(profile = entry.name, "aircraft profile selected");
    Some((entry.create)(arg))
}

/// Names of every eligible profile, in priority order.
pub fn eligible_names<P: ?Sized, A>(entries: &[ProfileEntry<P, A>], store: &DatarefStore) -> Vec<&'static str> {
    entries.iter().filter(|e| (e.eligible)(store)).map(|e| e.name).collect()
}

// ── Shared dataref helpers ────────────────────────────────────────────────────

/// Switch or knob position, rounded. `None` if the dataref is missing.
pub(crate) fn position(store: &DatarefStore, name: &str) -> Option<i32> {
    store.get::<f64>(name).map(|v| v.round() as i32)
}

/// `int != 0`, or `> 0.5` for floating point datarefs. Missing reads as off.
pub(crate) fn is_on(store: &DatarefStore, name: &str) -> bool {
    store.get::<f64>(name).is_some_and(|v| v > 0.5)
}

/// Element `index` of a float array dataref.
pub(crate) fn float_at(store: &DatarefStore, name: &str, index: usize) -> Option<f32> {
    store.get::<Vec<f32>>(name).and_then(|v| v.get(index).copied())
}

// ── Cached reads ──────────────────────────────────────────────────────────────
//
// Every scalar is cached as f32 so one dataref never flips between cache
// types, which would read as a change on every tick.

pub(crate) fn num(store: &DatarefStore, name: &str) -> f32 {
    store.get_cached::<f32>(name).unwrap_or(0.0)
}

pub(crate) fn on(store: &DatarefStore, name: &str) -> bool {
    num(store, name) > 0.5
}

pub(crate) fn array_at(store: &DatarefStore, name: &str, index: usize) -> Option<f32> {
    store.get_cached::<Vec<f32>>(name).and_then(|v| v.get(index).copied())
}

/// 0..1 ratio to an LED level.
pub(crate) fn level(ratio: f32) -> u8 {
    (ratio.clamp(0.0, 1.0) * 255.0) as u8
}

// ── Dataref watch ─────────────────────────────────────────────────────────────

type Register = fn(&DatarefStore, &str, &Arc<AtomicBool>) -> Option<MonitorId>;

fn register<T: DatarefType + 'static>(store: &DatarefStore, name: &str, flag: &Arc<AtomicBool>) -> Option<MonitorId> {
    let flag = Arc::clone(flag);
    store.monitor::<T, _>(name, move |_| flag.store(true, Ordering::Relaxed))
}

/// A set of dataref monitors that raise one shared dirty flag. Datarefs
/// missing when added are looked for again by [`Watch::refresh`].
#[derive(Debug)]
pub(crate) struct Watch {
    ids:     Vec<MonitorId>,
    missing: Vec<(String, Register)>,
    dirty:   Arc<AtomicBool>,
}

impl Watch {
    pub fn new() -> Self {
        Self { ids: Vec::new(), missing: Vec::new(), dirty: Arc::new(AtomicBool::new(true)) }
    }

    pub fn add<T: DatarefType + 'static>(&mut self, store: &DatarefStore, name: &str) {
        let reg: Register = register::<T>;
        match reg(store, name, &self.dirty) {
            Some(id) => self.ids.push(id),
            None => self.missing.push((name.to_string(), reg)),
        }
    }

    pub fn add_all<T: DatarefType + 'static>(&mut self, store: &DatarefStore, names: &[&str]) {
        for name in names {
            self.add::<T>(store, name);
        }
    }

    /// Start watching datarefs that appeared since they were added. A new
    /// monitor fires once, so the watch turns dirty.
    pub fn refresh(&mut self, store: &DatarefStore) {
        let (ids, dirty) = (&mut self.ids, &self.dirty);
        self.missing.retain(|(name, reg)| match reg(store, name, dirty) {
            Some(id) => {
                ids.push(id);
                false
            }
            None => true,
        });
    }

    /// `true` once after any watched dataref changed.
    pub fn take(&self) -> bool {
        self.dirty.swap(false, Ordering::Relaxed)
    }

    pub fn clear(&mut self, store: &DatarefStore) {
        for id in self.ids.drain(..) {
            store.remove_monitor(id);
        }
        self.missing.clear();
        self.dirty.store(true, Ordering::Relaxed);
    }
}

impl Default for Watch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xplm_shim::{DataRefValue, MockXplm};

    trait Named {
        fn label(&self) -> &'static str;
    }
    struct A;
    struct B;
    impl Named for A {
        fn label(&self) -> &'static str {
            "a"
        }
    }
    impl Named for B {
        fn label(&self) -> &'static str {
            "b"
        }
    }

    const ENTRIES: [ProfileEntry<dyn Named>; 2] = [
        ProfileEntry { name: "A", eligible: |s| s.exists("a/marker"), create: |()| Box::new(A) },
        ProfileEntry { name: "B", eligible: |s| s.exists("b/marker"), create: |()| Box::new(B) },
    ];

    #[test]
    fn first_eligible_wins() {
        let mock = Arc::new(MockXplm::new());
        let store = DatarefStore::new(mock.clone());
        assert!(detect(&ENTRIES, &store, ()).is_none());

        mock.set_dataref("b/marker", DataRefValue::Int(1));
        assert_eq!(detect(&ENTRIES, &store, ()).map(|p| p.label()), Some("b"));

        mock.set_dataref("a/marker", DataRefValue::Int(1));
        assert_eq!(detect(&ENTRIES, &store, ()).map(|p| p.label()), Some("a"));
        assert_eq!(eligible_names(&ENTRIES, &store), vec!["A", "B"]);
    }

    #[test]
    fn value_helpers() {
        let mock = Arc::new(MockXplm::new());
        mock.set_dataref("p/int", DataRefValue::Int(1));
        mock.set_dataref("p/float", DataRefValue::Float(0.6));
        mock.set_dataref("p/low", DataRefValue::Float(0.4));
        mock.set_dataref("p/arr", DataRefValue::FloatArray(vec![0.1, 0.9]));
        let store = DatarefStore::new(mock);
        assert_eq!(position(&store, "p/float"), Some(1));
        assert_eq!(position(&store, "p/none"), None);
        assert!(is_on(&store, "p/int"));
        assert!(is_on(&store, "p/float"));
        assert!(!is_on(&store, "p/low"));
        assert!(!is_on(&store, "p/none"));
        assert_eq!(float_at(&store, "p/arr", 1), Some(0.9));
        assert_eq!(float_at(&store, "p/arr", 5), None);
    }

    #[test]
    fn watch_flags_changes_until_cleared() {
        let mock = Arc::new(MockXplm::new());
        mock.set_dataref("w/a", DataRefValue::Float(1.0));
        let store = DatarefStore::new(mock.clone());
        let mut w = Watch::new();
        w.add::<f32>(&store, "w/a");
        assert!(w.take(), "dirty from the start");
        assert!(!w.take());

        store.update();
        assert!(!w.take(), "unchanged");
        mock.set_dataref("w/a", DataRefValue::Float(2.0));
        store.update();
        assert!(w.take());

        w.clear(&store);
        assert!(w.take(), "cleared watch starts dirty again");
        mock.set_dataref("w/a", DataRefValue::Float(3.0));
        store.update();
        assert!(!w.take(), "monitor removed");
    }

    #[test]
    fn watch_picks_up_late_datarefs() {
        let mock = Arc::new(MockXplm::new());
        let store = DatarefStore::new(mock.clone());
        let mut w = Watch::new();
        w.add_all::<f32>(&store, &["w/late"]);
        assert!(w.take());

        w.refresh(&store);
        assert!(!w.take(), "still missing");
        mock.set_dataref("w/late", DataRefValue::Int(1));
        w.refresh(&store);
        assert!(w.take(), "registered and fired");

        mock.set_dataref("w/late", DataRefValue::Int(2));
        store.update();
        assert!(w.take());
    }
}
