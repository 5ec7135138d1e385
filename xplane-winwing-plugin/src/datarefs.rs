//! Dataref store: typed reads and writes, a value cache polled once per
//! flight-loop tick, change callbacks and command execution.
//!
//! Everything here runs on the X-Plane main thread. Callbacks are invoked
//! with the internal lock released, so a callback may call back into the
//! store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::xplm_shim::{data_type, CommandHandle, CommandPhase, DataRefHandle, XplmApi};

// ── Cached values ─────────────────────────────────────────────────────────────

/// A dataref value as last observed, tagged with the type it was read as.
#[derive(Debug, Clone, PartialEq)]
pub enum Cached {
    Bool(bool),
    Int(i32),
    Float(f32),
    Double(f64),
    Text(String),
    Ints(Vec<i32>),
    Floats(Vec<f32>),
    Bytes(Vec<u8>),
}

impl Cached {
    /// Change test used by `update`; floating point values compare with an
    /// epsilon.
    fn differs(&self, other: &Cached) -> bool {
        match (self, other) {
            (Cached::Float(a), Cached::Float(b))   => (a - b).abs() > f32::EPSILON,
            (Cached::Double(a), Cached::Double(b)) => (a - b).abs() > f64::EPSILON,
            _ => self != other,
        }
    }

    fn reread(&self, xplm: &dyn XplmApi, h: DataRefHandle) -> Cached {
        match self {
            Cached::Bool(_)   => bool::read(xplm, h).into_cached(),
            Cached::Int(_)    => i32::read(xplm, h).into_cached(),
            Cached::Float(_)  => f32::read(xplm, h).into_cached(),
            Cached::Double(_) => f64::read(xplm, h).into_cached(),
            Cached::Text(_)   => String::read(xplm, h).into_cached(),
            Cached::Ints(_)   => Vec::<i32>::read(xplm, h).into_cached(),
            Cached::Floats(_) => Vec::<f32>::read(xplm, h).into_cached(),
            Cached::Bytes(_)  => Vec::<u8>::read(xplm, h).into_cached(),
        }
    }
}

/// Read a scalar dataref through whichever accessor its type supports.
fn read_number(xplm: &dyn XplmApi, h: DataRefHandle) -> f64 {
    let types = xplm.dataref_types(h);
    if types & data_type::FLOAT != 0 {
        f64::from(xplm.get_float(h))
    } else if types & data_type::DOUBLE != 0 {
        xplm.get_double(h)
    } else {
        f64::from(xplm.get_int(h))
    }
}

fn write_number(xplm: &dyn XplmApi, h: DataRefHandle, value: f64) {
    let types = xplm.dataref_types(h);
    if types & data_type::FLOAT != 0 {
        xplm.set_float(h, value as f32);
    } else if types & data_type::DOUBLE != 0 {
        xplm.set_double(h, value);
    } else {
        xplm.set_int(h, value as i32);
    }
}

/// Types a dataref can be read and written as.
pub trait DatarefType: Sized + Clone {
    fn read(xplm: &dyn XplmApi, h: DataRefHandle) -> Self;
    fn write(&self, xplm: &dyn XplmApi, h: DataRefHandle);
    fn into_cached(self) -> Cached;
    fn from_cached(c: &Cached) -> Option<Self>;
}

impl DatarefType for bool {
    fn read(xplm: &dyn XplmApi, h: DataRefHandle) -> Self {
        let types = xplm.dataref_types(h);
        if types & data_type::FLOAT != 0 {
            xplm.get_float(h) > f32::EPSILON
        } else if types & data_type::DOUBLE != 0 {
            xplm.get_double(h) > f64::EPSILON
        } else {
            xplm.get_int(h) > 0
        }
    }
    fn write(&self, xplm: &dyn XplmApi, h: DataRefHandle) {
        write_number(xplm, h, if *self { 1.0 } else { 0.0 });
    }
    fn into_cached(self) -> Cached {
        Cached::Bool(self)
    }
    fn from_cached(c: &Cached) -> Option<Self> {
        match c {
            Cached::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

macro_rules! scalar_type {
    ($t:ty, $variant:ident) => {
        impl DatarefType for $t {
            fn read(xplm: &dyn XplmApi, h: DataRefHandle) -> Self {
                read_number(xplm, h) as $t
            }
            fn write(&self, xplm: &dyn XplmApi, h: DataRefHandle) {
                write_number(xplm, h, f64::from(*self));
            }
            fn into_cached(self) -> Cached {
                Cached::$variant(self)
            }
            fn from_cached(c: &Cached) -> Option<Self> {
                match c {
                    Cached::$variant(v) => Some(*v),
                    _ => None,
                }
            }
        }
    };
}

scalar_type!(i32, Int);
scalar_type!(f32, Float);
scalar_type!(f64, Double);

macro_rules! array_type {
    ($t:ty, $variant:ident, $get:ident, $set:ident) => {
        impl DatarefType for Vec<$t> {
            fn read(xplm: &dyn XplmApi, h: DataRefHandle) -> Self {
                let len = xplm.$get(h, 0, &mut []);
                let mut out = vec![<$t>::default(); len];
                if len > 0 {
                    let n = xplm.$get(h, 0, &mut out);
                    out.truncate(n);
                }
                out
            }
            fn write(&self, xplm: &dyn XplmApi, h: DataRefHandle) {
                xplm.$set(h, 0, self);
            }
            fn into_cached(self) -> Cached {
                Cached::$variant(self)
            }
            fn from_cached(c: &Cached) -> Option<Self> {
                match c {
                    Cached::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

array_type!(i32, Ints, get_int_array, set_int_array);
array_type!(f32, Floats, get_float_array, set_float_array);
array_type!(u8, Bytes, get_bytes, set_bytes);

impl DatarefType for String {
    /// Byte datarefs as text, with every NUL removed.
    fn read(xplm: &dyn XplmApi, h: DataRefHandle) -> Self {
        let bytes: Vec<u8> = Vec::<u8>::read(xplm, h).into_iter().filter(|&b| b != 0).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
    fn write(&self, xplm: &dyn XplmApi, h: DataRefHandle) {
        xplm.set_bytes(h, 0, self.as_bytes());
    }
    fn into_cached(self) -> Cached {
        Cached::Text(self)
    }
    fn from_cached(c: &Cached) -> Option<Self> {
        match c {
            Cached::Text(v) => Some(v.clone()),
            _ => None,
        }
    }
}

// ── DatarefStore ──────────────────────────────────────────────────────────────

/// Token returned by [`DatarefStore::monitor`], used to remove that one
/// callback again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorId(u64);

type Callback = Box<dyn FnMut(&Cached) + Send>;

struct Entry {
    value:       Cached,
    last_update: u64,
}

/// Removals that hit a callback list while it was out running.
#[derive(Default)]
struct Firing {
    removed: HashSet<MonitorId>,
    unbound: bool,
}

#[derive(Default)]
struct StoreInner {
    handles:  HashMap<String, DataRefHandle>,
    commands: HashMap<String, CommandHandle>,
    cache:    HashMap<String, Entry>,
    monitors: HashMap<String, Vec<(MonitorId, Callback)>>,
    firing:   HashMap<String, Firing>,
    cycle:    u64,
    next_id:  u64,
}

pub struct DatarefStore {
    xplm:  Arc<dyn XplmApi>,
    inner: Mutex<StoreInner>,
}

impl DatarefStore {
    pub fn new(xplm: Arc<dyn XplmApi>) -> Self {
        Self { xplm, inner: Mutex::new(StoreInner::default()) }
    }

    pub fn xplm(&self) -> &Arc<dyn XplmApi> {
        &self.xplm
    }

    /// Current update cycle; advanced by every [`update`](Self::update).
    pub fn cycle(&self) -> u64 {
        self.inner.lock().cycle
    }

    /// Found handles are remembered; missing ones are looked up again on the
    /// next call so late-registered aircraft datarefs appear eventually.
    fn find(&self, name: &str) -> Option<DataRefHandle> {
        if let Some(h) = self.inner.lock().handles.get(name) {
            return Some(*h);
        }
        let h = self.xplm.find_dataref(name)?;
        self.inner.lock().handles.insert(name.to_string(), h);
        Some(h)
    }

    fn find_command(&self, name: &str) -> Option<CommandHandle> {
        if let Some(h) = self.inner.lock().commands.get(name) {
            return Some(*h);
        }
        let h = self.xplm.find_command(name)?;
        self.inner.lock().commands.insert(name.to_string(), h);
        Some(h)
    }

    /// Whether the dataref exists right now. Never cached, so eligibility
    /// checks see aircraft datarefs disappear on unload.
    pub fn exists(&self, name: &str) -> bool {
        self.xplm.find_dataref(name).is_some()
    }

    pub fn command_exists(&self, name: &str) -> bool {
        self.xplm.find_command(name).is_some()
    }

    /// Live read. Does not touch the cache.
    pub fn get<T: DatarefType>(&self, name: &str) -> Option<T> {
        let h = self.find(name)?;
        Some(T::read(self.xplm.as_ref(), h))
    }

    /// Cached read. The first call reads live and starts tracking the
    /// dataref in [`update`](Self::update).
    pub fn get_cached<T: DatarefType>(&self, name: &str) -> Option<T> {
        if let Some(v) = self.inner.lock().cache.get(name).and_then(|e| T::from_cached(&e.value)) {
            return Some(v);
        }
        let value = self.get::<T>(name)?;
        let mut g = self.inner.lock();
        let cycle = g.cycle;
        g.cache.insert(name.to_string(), Entry { value: value.clone().into_cached(), last_update: cycle });
        Some(value)
    }

    /// Cycle at which the cached value last changed; `None` if not cached.
    pub fn last_update(&self, name: &str) -> Option<u64> {
        self.inner.lock().cache.get(name).map(|e| e.last_update)
    }

    /// Write a value. The cache is updated and change callbacks fire
    /// immediately. Missing datarefs are ignored.
    pub fn set<T: DatarefType>(&self, name: &str, value: T) {
        let Some(h) = self.find(name) else {
            debug!(dataref = name, "write to missing dataref ignored");
            return;
        };
        value.write(self.xplm.as_ref(), h);
        {
            let mut g = self.inner.lock();
            let cycle = g.cycle;
            g.cache.insert(name.to_string(), Entry { value: value.into_cached(), last_update: cycle });
        }
        self.execute_changed_callbacks(name);
    }

    /// Watch a dataref. The value is cached and the callback fires once
    /// straight away, then on every change seen by `update` or `set`.
    /// Returns `None` if the dataref does not exist.
    pub fn monitor<T, F>(&self, name: &str, mut callback: F) -> Option<MonitorId>
    where
        T: DatarefType + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let initial = self.get_cached::<T>(name)?;
        callback(initial);

        let mut g = self.inner.lock();
        g.next_id += 1;
        let id = MonitorId(g.next_id);
        let wrapped: Callback = Box::new(move |c: &Cached| {
            if let Some(v) = T::from_cached(c) {
                callback(v);
            }
        });
        g.monitors.entry(name.to_string()).or_default().push((id, wrapped));
        Some(id)
    }

    /// Remove one callback registered by `monitor`. Safe to call from inside
    /// a callback, including the one being removed.
    pub fn remove_monitor(&self, id: MonitorId) {
        let mut g = self.inner.lock();
        for list in g.monitors.values_mut() {
            list.retain(|(mid, _)| *mid != id);
        }
        g.monitors.retain(|_, list| !list.is_empty());
        for f in g.firing.values_mut() {
            f.removed.insert(id);
        }
    }

    /// Remove every callback for a dataref. Its cached value is kept.
    pub fn unbind(&self, name: &str) {
        let mut g = self.inner.lock();
        g.monitors.remove(name);
        if let Some(f) = g.firing.get_mut(name) {
            f.unbound = true;
        }
    }

    /// Fire every callback of `name` with its cached value. A change made
    /// from inside one of them does not fire `name` again.
    pub fn execute_changed_callbacks(&self, name: &str) {
        let (value, mut callbacks) = {
            let mut g = self.inner.lock();
            if g.firing.contains_key(name) {
                return;
            }
            let Some(value) = g.cache.get(name).map(|e| e.value.clone()) else { return };
            let Some(callbacks) = g.monitors.remove(name) else { return };
            g.firing.insert(name.to_string(), Firing::default());
            (value, callbacks)
        };

        for (id, cb) in callbacks.iter_mut() {
            let skip = self.inner.lock().firing.get(name).is_some_and(|f| f.unbound || f.removed.contains(id));
            if !skip {
                cb(&value);
            }
        }

        let mut g = self.inner.lock();
        let firing = g.firing.remove(name).unwrap_or_default();
        if firing.unbound {
            return;
        }
        callbacks.retain(|(id, _)| !firing.removed.contains(id));
        if callbacks.is_empty() {
            return;
        }
        // Back in front of anything registered while they ran.
        let slot = g.monitors.entry(name.to_string()).or_default();
        callbacks.append(slot);
        *slot = callbacks;
    }

    /// Run a command. `Continue` has no SDK equivalent and is a no-op.
    /// Returns `false` if the command does not exist.
    pub fn execute_command(&self, name: &str, phase: CommandPhase) -> bool {
        let Some(h) = self.find_command(name) else {
            debug!(command = name, "command not found");
            return false;
        };
        match phase {
            CommandPhase::Begin    => self.xplm.command_begin(h),
            CommandPhase::End      => self.xplm.command_end(h),
            CommandPhase::Once     => self.xplm.command_once(h),
            CommandPhase::Continue => {}
        }
        true
    }

    /// Re-read every cached dataref, once per flight-loop tick, and fire the
    /// callbacks of those that changed.
    pub fn update(&self) {
        let entries: Vec<(String, Cached, DataRefHandle)> = {
            let mut g = self.inner.lock();
            g.cycle += 1;
            g.cache
                .iter()
                .filter_map(|(name, e)| g.handles.get(name).map(|h| (name.clone(), e.value.clone(), *h)))
                .collect()
        };

        let mut changed = Vec::new();
        for (name, old, h) in entries {
            let new = old.reread(self.xplm.as_ref(), h);
            if old.differs(&new) {
                changed.push((name, new));
            }
        }

        if changed.is_empty() {
            return;
        }
        {
            let mut g = self.inner.lock();
            let cycle = g.cycle;
            for (name, new) in &changed {
                g.cache.insert(name.clone(), Entry { value: new.clone(), last_update: cycle });
            }
        }
        for (name, _) in &changed {
            self.execute_changed_callbacks(name);
        }
    }

    /// Drop cached values and handles, e.g. after an aircraft change.
    pub fn clear(&self) {
        let mut g = self.inner.lock();
        g.cache.clear();
        g.handles.clear();
        g.commands.clear();
        g.monitors.clear();
        for f in g.firing.values_mut() {
            f.unbound = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xplm_shim::{DataRefValue, MockXplm};
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    fn make_store() -> (Arc<MockXplm>, DatarefStore) {
        let mock = Arc::new(MockXplm::new());
        mock.set_dataref("sim/test/int", DataRefValue::Int(3));
        mock.set_dataref("sim/test/float", DataRefValue::Float(1.5));
        mock.set_dataref("sim/test/floats", DataRefValue::FloatArray(vec![0.1, 0.2, 0.3]));
        mock.set_dataref("sim/test/text", DataRefValue::Bytes(b"KJFK\0\0".to_vec()));
        mock.add_command("sim/test/cmd");
        let store = DatarefStore::new(mock.clone());
        (mock, store)
    }

    #[test]
    fn typed_reads() {
        let (_mock, store) = make_store();
        assert_eq!(store.get::<i32>("sim/test/int"), Some(3));
        assert_eq!(store.get::<f32>("sim/test/int"), Some(3.0));
        assert_eq!(store.get::<bool>("sim/test/float"), Some(true));
        assert_eq!(store.get::<Vec<f32>>("sim/test/floats"), Some(vec![0.1, 0.2, 0.3]));
        assert_eq!(store.get::<String>("sim/test/text").as_deref(), Some("KJFK"));
        assert_eq!(store.get::<i32>("sim/test/missing"), None);
        assert!(store.exists("sim/test/int"));
        assert!(!store.exists("sim/test/missing"));
        assert!(store.command_exists("sim/test/cmd"));
    }

    #[test]
    fn monitor_fires_immediately_and_on_change() {
        let (mock, store) = make_store();
        let seen = Arc::new(AtomicI32::new(-1));
        let calls = Arc::new(AtomicUsize::new(0));
        let (s, c) = (seen.clone(), calls.clone());
        store
            .monitor::<i32, _>("sim/test/int", move |v| {
                s.store(v, Ordering::SeqCst);
                c.fetch_add(1, Ordering::SeqCst);
            })
            .expect("dataref exists");
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.update();
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no change, no callback");

        mock.set_dataref("sim/test/int", DataRefValue::Int(7));
        store.update();
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.last_update("sim/test/int"), Some(store.cycle()));
    }

    #[test]
    fn unbind_stops_callbacks() {
        let (mock, store) = make_store();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let id = store
            .monitor::<f32, _>("sim/test/float", move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .expect("dataref exists");
        store.remove_monitor(id);
        mock.set_dataref("sim/test/float", DataRefValue::Float(2.5));
        store.update();
        assert_eq!(calls.load(Ordering::SeqCst), 1, "only the initial call");

        let c = calls.clone();
        store.monitor::<f32, _>("sim/test/float", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        store.unbind("sim/test/float");
        mock.set_dataref("sim/test/float", DataRefValue::Float(3.5));
        store.update();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn set_writes_and_fires() {
        let (mock, store) = make_store();
        let seen = Arc::new(AtomicI32::new(0));
        let s = seen.clone();
        store.monitor::<i32, _>("sim/test/int", move |v| s.store(v, Ordering::SeqCst));
        store.set("sim/test/int", 42);
        assert_eq!(seen.load(Ordering::SeqCst), 42);
        assert_eq!(mock.dataref("sim/test/int"), Some(DataRefValue::Int(42)));
        assert_eq!(store.get_cached::<i32>("sim/test/int"), Some(42));

        store.set("sim/test/float", true);
        assert_eq!(mock.dataref("sim/test/float"), Some(DataRefValue::Float(1.0)));

        store.set("sim/test/missing", 1);
        assert!(mock.dataref("sim/test/missing").is_none());
    }

    #[test]
    fn commands_by_phase() {
        let (mock, store) = make_store();
        assert!(store.execute_command("sim/test/cmd", CommandPhase::Begin));
        assert!(store.execute_command("sim/test/cmd", CommandPhase::Continue));
        assert!(store.execute_command("sim/test/cmd", CommandPhase::End));
        assert!(store.execute_command("sim/test/cmd", CommandPhase::Once));
        assert!(!store.execute_command("sim/test/nope", CommandPhase::Once));
        assert_eq!(
            mock.command_calls(),
            vec![
                ("sim/test/cmd".to_string(), CommandPhase::Begin),
                ("sim/test/cmd".to_string(), CommandPhase::End),
                ("sim/test/cmd".to_string(), CommandPhase::Once),
            ]
        );
    }

    #[test]
    fn callback_may_reenter_store() {
        let (mock, store) = make_store();
        let store = Arc::new(store);
        let inner = store.clone();
        let seen = Arc::new(AtomicI32::new(0));
        let s = seen.clone();
        store.monitor::<i32, _>("sim/test/int", move |v| {
            let f = inner.get_cached::<f32>("sim/test/float").unwrap_or_default();
            s.store(v + f as i32, Ordering::SeqCst);
        });
        mock.set_dataref("sim/test/int", DataRefValue::Int(10));
        store.update();
        assert_eq!(seen.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn removal_from_inside_a_callback_sticks() {
        let (mock, store) = make_store();
        let store = Arc::new(store);
        let calls = Arc::new(AtomicUsize::new(0));

        let own_id = Arc::new(Mutex::new(None::<MonitorId>));
        let (inner, slot, c) = (store.clone(), own_id.clone(), calls.clone());
        let id = store.monitor::<i32, _>("sim/test/int", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *slot.lock() {
                inner.remove_monitor(id);
            }
        });
        *own_id.lock() = id;

        let (inner, c) = (store.clone(), calls.clone());
        store.monitor::<f32, _>("sim/test/float", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            inner.unbind("sim/test/float");
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2, "initial calls");

        mock.set_dataref("sim/test/int", DataRefValue::Int(4));
        mock.set_dataref("sim/test/float", DataRefValue::Float(4.5));
        store.update();
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        mock.set_dataref("sim/test/int", DataRefValue::Int(5));
        mock.set_dataref("sim/test/float", DataRefValue::Float(5.5));
        store.update();
        assert_eq!(calls.load(Ordering::SeqCst), 4, "both removed themselves");
    }

    #[test]
    fn other_callbacks_survive_a_removal_mid_fire() {
        let (mock, store) = make_store();
        let store = Arc::new(store);
        let calls = Arc::new(AtomicUsize::new(0));

        let victim = Arc::new(Mutex::new(None::<MonitorId>));
        let (inner, v) = (store.clone(), victim.clone());
        store.monitor::<i32, _>("sim/test/int", move |_| {
            if let Some(id) = v.lock().take() {
                inner.remove_monitor(id);
            }
        });
        let c = calls.clone();
        *victim.lock() = store.monitor::<i32, _>("sim/test/int", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let c = calls.clone();
        store.monitor::<i32, _>("sim/test/int", move |_| {
            c.fetch_add(10, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 11);

        mock.set_dataref("sim/test/int", DataRefValue::Int(8));
        store.update();
        assert_eq!(calls.load(Ordering::SeqCst), 21, "removed before its turn");
        mock.set_dataref("sim/test/int", DataRefValue::Int(9));
        store.update();
        assert_eq!(calls.load(Ordering::SeqCst), 31);
    }
}
