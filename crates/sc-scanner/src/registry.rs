//! Grouping of conflict paths by canonical path.
//!
//! This module provides [`SibshipRegistry`], which ingests the conflict paths
//! produced by a walk and clusters them into [`Sibship`]s: one per canonical
//! path, holding every discovered variant in discovery order.
//!
//! # Notifications
//!
//! A single [`MembershipListener`] may be registered when the registry is
//! built. It is called synchronously from [`SibshipRegistry::ingest`] once per
//! ingested path, plus once more for the canonical file when a new group is
//! created and that file exists. Listeners receive a [`MembershipChange`]
//! describing the group and the path just added, so they can update
//! incrementally.
//!
//! # Filesystem Access
//!
//! The registry never reads the filesystem itself. Existence checks go through
//! a [`PathProbe`], which defaults to [`DiskProbe`].
//!
//! # Examples
//!
//! ```
//! use camino::Utf8Path;
//! use sc_scanner::SibshipRegistry;
//!
//! let mut registry = SibshipRegistry::new();
//! let (first, created) = registry.ingest(Utf8Path::new(
//!     "/sync/a.sync-conflict-20230723-000249-ONMECE6.txt",
//! ));
//! assert!(created);
//!
//! let (second, created) = registry.ingest(Utf8Path::new(
//!     "/sync/a.sync-conflict-20230724-101112-ABCDE12.txt",
//! ));
//! assert!(!created);
//! assert_eq!(first, second);
//!
//! let sibship = registry.get(first).unwrap();
//! assert_eq!(sibship.canonical(), "/sync/a.txt");
//! assert_eq!(sibship.members().len(), 2);
//! ```

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use sc_core::{FxHashMap, canonical_path, fx_hash_map, fx_hash_set};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, trace};

/// Identifies a [`Sibship`] within one registry.
///
/// Ids are assigned in creation order and are only meaningful for the
/// registry that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SibshipId(pub usize);

impl SibshipId {
    /// Returns the inner index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SibshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A group of paths that conflict over the same canonical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sibship {
    id: SibshipId,
    canonical: Utf8PathBuf,
    /// Discovered paths, in ingestion order.
    members: SmallVec<[Utf8PathBuf; 4]>,
}

impl Sibship {
    fn new(id: SibshipId, canonical: Utf8PathBuf) -> Self {
        Self {
            id,
            canonical,
            members: SmallVec::new(),
        }
    }

    /// Returns this sibship's id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> SibshipId {
        self.id
    }

    /// Returns the canonical path every member normalizes to.
    #[inline]
    #[must_use]
    pub fn canonical(&self) -> &Utf8Path {
        &self.canonical
    }

    /// Returns the discovered paths, in ingestion order.
    #[inline]
    #[must_use]
    pub fn members(&self) -> &[Utf8PathBuf] {
        &self.members
    }

    /// Returns `true` if `path` was ingested into this sibship.
    #[must_use]
    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.members.iter().any(|member| member == path)
    }

    /// Returns the canonical path followed by the members.
    ///
    /// The canonical path is left out when it was itself ingested, so it is
    /// never listed twice.
    #[must_use]
    pub fn paths_to_compare(&self) -> Vec<&Utf8Path> {
        let mut paths = Vec::with_capacity(self.members.len() + 1);
        if !self.contains(&self.canonical) {
            paths.push(self.canonical.as_path());
        }
        paths.extend(self.members.iter().map(Utf8PathBuf::as_path));
        paths
    }
}

/// Read-only filesystem queries used by the registry.
pub trait PathProbe {
    /// Returns `true` if anything exists at `path`.
    fn exists(&self, path: &Utf8Path) -> bool;

    /// Returns `true` if `path` is a regular file.
    fn is_file(&self, path: &Utf8Path) -> bool;
}

/// A [`PathProbe`] that asks the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskProbe;

impl PathProbe for DiskProbe {
    #[inline]
    fn exists(&self, path: &Utf8Path) -> bool {
        path.exists()
    }

    #[inline]
    fn is_file(&self, path: &Utf8Path) -> bool {
        path.is_file()
    }
}

/// How a path joined its sibship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    /// The pre-existing canonical file, announced when its group is created.
    Canonical,
    /// A path delivered by the walker.
    Conflict,
}

/// Payload of a membership notification.
#[derive(Debug, Clone, Copy)]
pub struct MembershipChange<'a> {
    /// The sibship after the change.
    pub sibship: &'a Sibship,
    /// The path just added.
    pub path: &'a Utf8Path,
    /// Whether `path` is the canonical file or a discovered path.
    pub kind: MemberKind,
    /// Whether this ingest created the sibship.
    pub is_new_group: bool,
}

/// Receives membership notifications from a [`SibshipRegistry`].
///
/// Implemented for any `FnMut(&MembershipChange<'_>)` closure.
pub trait MembershipListener {
    /// Called after `change.path` was added to `change.sibship`.
    fn on_membership_changed(&mut self, change: &MembershipChange<'_>);
}

impl<F> MembershipListener for F
where
    F: FnMut(&MembershipChange<'_>),
{
    fn on_membership_changed(&mut self, change: &MembershipChange<'_>) {
        self(change);
    }
}

/// Outcome of [`SibshipRegistry::remove_member`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Removal {
    /// Whether the path was a member before the call.
    pub removed: bool,
    /// Extant paths left in the sibship.
    pub extant: usize,
    /// The sibship has at most one extant path and may be retired.
    pub resolved: bool,
}

/// Owns every [`Sibship`] of one scan session.
///
/// Not thread-safe by itself: it is meant to be driven from one consuming
/// loop, so none of its state is locked.
pub struct SibshipRegistry {
    /// Sibships in creation order; a [`SibshipId`] indexes this vector.
    sibships: Vec<Sibship>,
    /// Canonical path to sibship.
    index: FxHashMap<Utf8PathBuf, SibshipId>,
    listener: Option<Box<dyn MembershipListener + Send>>,
    probe: Box<dyn PathProbe + Send>,
}

impl fmt::Debug for SibshipRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SibshipRegistry")
            .field("sibships", &self.sibships)
            .field("has_listener", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for SibshipRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SibshipRegistry {
    /// Creates an empty registry that probes the real filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sibships: Vec::new(),
            index: fx_hash_map(),
            listener: None,
            probe: Box::new(DiskProbe),
        }
    }

    /// Registers the membership listener.
    ///
    /// Only one listener is kept; a second call replaces the first.
    #[must_use]
    pub fn with_listener(mut self, listener: impl MembershipListener + Send + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Replaces the filesystem probe.
    #[must_use]
    pub fn with_probe(mut self, probe: impl PathProbe + Send + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Adds a discovered path to the sibship of its canonical path.
    ///
    /// Returns the sibship's id and whether it was created by this call. The
    /// listener is notified before this returns.
    pub fn ingest(&mut self, path: &Utf8Path) -> (SibshipId, bool) {
        let canonical = canonical_path(path);

        if let Some(&id) = self.index.get(&canonical) {
            self.sibships[id.0].members.push(path.to_owned());
            trace!(sibship = %id, path = %path, "Added path to existing sibship");
            self.notify(id, path, MemberKind::Conflict, false);
            return (id, false);
        }

        let id = SibshipId(self.sibships.len());
        let announce_canonical = path != canonical && self.probe.is_file(&canonical);

        debug!(sibship = %id, canonical = %canonical, "Created sibship");
        self.sibships.push(Sibship::new(id, canonical.clone()));
        self.index.insert(canonical, id);

        // The canonical path is announced while the sibship has no members.
        if announce_canonical {
            let canonical = self.sibships[id.0].canonical.clone();
            self.notify(id, &canonical, MemberKind::Canonical, true);
        }
        self.sibships[id.0].members.push(path.to_owned());
        self.notify(id, path, MemberKind::Conflict, true);

        (id, true)
    }

    fn notify(&mut self, id: SibshipId, path: &Utf8Path, kind: MemberKind, is_new_group: bool) {
        let Some(listener) = self.listener.as_mut() else {
            return;
        };
        let change = MembershipChange {
            sibship: &self.sibships[id.0],
            path,
            kind,
            is_new_group,
        };
        listener.on_membership_changed(&change);
    }

    /// Counts the paths of a sibship that exist right now.
    ///
    /// Considers the canonical path and every member, each once. Unknown ids
    /// count zero.
    #[must_use]
    pub fn extant_count(&self, id: SibshipId) -> usize {
        let Some(sibship) = self.get(id) else {
            return 0;
        };

        let mut seen = fx_hash_set();
        sibship
            .paths_to_compare()
            .into_iter()
            .filter(|path| seen.insert(*path))
            .filter(|path| self.probe.exists(path))
            .count()
    }

    /// Removes `path` from a sibship's members.
    ///
    /// The file itself is left alone. Returns `None` for an unknown id. The
    /// sibship stays registered even when the result is `resolved`.
    pub fn remove_member(&mut self, id: SibshipId, path: &Utf8Path) -> Option<Removal> {
        let sibship = self.sibships.get_mut(id.0)?;

        let before = sibship.members.len();
        sibship.members.retain(|member| member != path);
        let removed = sibship.members.len() != before;

        let extant = self.extant_count(id);
        let resolved = extant <= 1;
        debug!(sibship = %id, path = %path, removed, extant, resolved, "Removed sibship member");

        Some(Removal {
            removed,
            extant,
            resolved,
        })
    }

    /// Returns the sibship with the given id.
    #[inline]
    #[must_use]
    pub fn get(&self, id: SibshipId) -> Option<&Sibship> {
        self.sibships.get(id.0)
    }

    /// Returns the sibship keyed by `canonical`.
    #[must_use]
    pub fn get_by_canonical(&self, canonical: &Utf8Path) -> Option<&Sibship> {
        self.index.get(canonical).and_then(|&id| self.get(id))
    }

    /// Returns the sibship `path` belongs to, if it was ingested.
    #[must_use]
    pub fn find_by_member(&self, path: &Utf8Path) -> Option<&Sibship> {
        self.get_by_canonical(&canonical_path(path))
            .filter(|sibship| sibship.contains(path))
    }

    /// Iterates over all sibships in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Sibship> {
        self.sibships.iter()
    }

    /// Iterates over sibships that still have more than one extant path.
    pub fn unresolved(&self) -> impl Iterator<Item = &Sibship> {
        self.sibships
            .iter()
            .filter(|sibship| self.extant_count(sibship.id) > 1)
    }

    /// Returns the number of sibships.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sibships.len()
    }

    /// Returns `true` if nothing has been ingested.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sibships.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use sc_core::FxHashSet;

    use super::*;

    const A1: &str = "/sync/a.sync-conflict-20230723-000249-ONMECE6.txt";
    const A2: &str = "/sync/a.sync-conflict-20230724-101112-ABCDE12.txt";
    const B1: &str = "/sync/b.sync-conflict-20230723-000249-ONMECE6.md";

    /// A fixed, shareable view of which paths exist.
    #[derive(Clone, Default)]
    struct FakeDisk(Arc<Mutex<FxHashSet<Utf8PathBuf>>>);

    impl FakeDisk {
        fn with(paths: &[&str]) -> Self {
            let disk = Self::default();
            for path in paths {
                disk.add(path);
            }
            disk
        }

        fn add(&self, path: &str) {
            self.0.lock().unwrap().insert(Utf8PathBuf::from(path));
        }

        fn delete(&self, path: &str) {
            self.0.lock().unwrap().remove(Utf8Path::new(path));
        }
    }

    impl PathProbe for FakeDisk {
        fn exists(&self, path: &Utf8Path) -> bool {
            self.0.lock().unwrap().contains(path)
        }

        fn is_file(&self, path: &Utf8Path) -> bool {
            self.exists(path)
        }
    }

    type Events = Arc<Mutex<Vec<(SibshipId, String, MemberKind, bool)>>>;

    fn recording_registry(disk: &FakeDisk) -> (SibshipRegistry, Events) {
        let events: Events = Arc::default();
        let sink = Arc::clone(&events);
        let registry = SibshipRegistry::new()
            .with_probe(disk.clone())
            .with_listener(move |change: &MembershipChange<'_>| {
                sink.lock().unwrap().push((
                    change.sibship.id(),
                    change.path.to_string(),
                    change.kind,
                    change.is_new_group,
                ));
            });
        (registry, events)
    }

    #[test]
    fn test_ingest_groups_by_canonical() {
        let disk = FakeDisk::with(&["/sync/a.txt", A1, A2, B1]);
        let (mut registry, _) = recording_registry(&disk);

        let (a, created_a) = registry.ingest(Utf8Path::new(A1));
        let (b, created_b) = registry.ingest(Utf8Path::new(B1));
        let (a_again, created_again) = registry.ingest(Utf8Path::new(A2));

        assert!(created_a && created_b && !created_again);
        assert_eq!(a, a_again);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        let sibship = registry.get(a).unwrap();
        assert_eq!(sibship.canonical(), "/sync/a.txt");
        assert_eq!(sibship.members(), [Utf8PathBuf::from(A1), Utf8PathBuf::from(A2)]);
    }

    #[test]
    fn test_canonical_notification_precedes_first_member() {
        let disk = FakeDisk::with(&["/sync/a.txt", A1, A2]);
        let (mut registry, events) = recording_registry(&disk);

        registry.ingest(Utf8Path::new(A1));
        registry.ingest(Utf8Path::new(A2));

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                (SibshipId(0), "/sync/a.txt".to_owned(), MemberKind::Canonical, true),
                (SibshipId(0), A1.to_owned(), MemberKind::Conflict, true),
                (SibshipId(0), A2.to_owned(), MemberKind::Conflict, false),
            ]
        );
    }

    #[test]
    fn test_listener_sees_members_as_of_each_change() {
        let disk = FakeDisk::with(&["/sync/a.txt", A1, A2]);
        let seen: Arc<Mutex<Vec<(MemberKind, usize)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let mut registry = SibshipRegistry::new()
            .with_probe(disk)
            .with_listener(move |change: &MembershipChange<'_>| {
                sink.lock()
                    .unwrap()
                    .push((change.kind, change.sibship.members().len()));
            });

        registry.ingest(Utf8Path::new(A1));
        registry.ingest(Utf8Path::new(A2));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (MemberKind::Canonical, 0),
                (MemberKind::Conflict, 1),
                (MemberKind::Conflict, 2),
            ]
        );
    }

    #[test]
    fn test_no_canonical_notification_when_missing() {
        let disk = FakeDisk::with(&[A1]);
        let (mut registry, events) = recording_registry(&disk);

        registry.ingest(Utf8Path::new(A1));

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].2, MemberKind::Conflict);
    }

    #[test]
    fn test_unmarked_path_is_its_own_canonical() {
        let disk = FakeDisk::with(&["/sync/notes.sync-conflict-abc"]);
        let (mut registry, events) = recording_registry(&disk);

        // Matches the loose name check but has no full marker to excise.
        let path = Utf8Path::new("/sync/notes.sync-conflict-abc");
        let (id, created) = registry.ingest(path);

        assert!(created);
        assert_eq!(registry.get(id).unwrap().canonical(), path);
        assert_eq!(registry.get(id).unwrap().paths_to_compare(), vec![path]);
        assert_eq!(events.lock().unwrap().len(), 1);
        assert_eq!(registry.extant_count(id), 1);
    }

    #[test]
    fn test_paths_to_compare_puts_canonical_first() {
        let mut registry = SibshipRegistry::new().with_probe(FakeDisk::default());
        let (id, _) = registry.ingest(Utf8Path::new(A1));
        registry.ingest(Utf8Path::new(A2));

        let paths = registry.get(id).unwrap().paths_to_compare();
        assert_eq!(
            paths,
            vec![Utf8Path::new("/sync/a.txt"), Utf8Path::new(A1), Utf8Path::new(A2)]
        );
    }

    #[test]
    fn test_extant_count_is_live() {
        let disk = FakeDisk::with(&["/sync/a.txt", A1, A2]);
        let (mut registry, _) = recording_registry(&disk);
        let (id, _) = registry.ingest(Utf8Path::new(A1));
        registry.ingest(Utf8Path::new(A2));

        assert_eq!(registry.extant_count(id), 3);

        disk.delete("/sync/a.txt");
        assert_eq!(registry.extant_count(id), 2);

        disk.add("/sync/a.txt");
        assert_eq!(registry.extant_count(id), 3);
    }

    #[test]
    fn test_extant_count_deduplicates() {
        let disk = FakeDisk::with(&[A1]);
        let mut registry = SibshipRegistry::new().with_probe(disk);
        let (id, _) = registry.ingest(Utf8Path::new(A1));
        registry.ingest(Utf8Path::new(A1));

        assert_eq!(registry.get(id).unwrap().members().len(), 2);
        assert_eq!(registry.extant_count(id), 1);
    }

    #[test]
    fn test_extant_count_unknown_id() {
        let registry = SibshipRegistry::new();
        assert_eq!(registry.extant_count(SibshipId(7)), 0);
    }

    #[test]
    fn test_remove_member_after_external_delete() {
        let disk = FakeDisk::with(&["/sync/a.txt", A1, A2, "/sync/b.md", B1]);
        let mut registry = SibshipRegistry::new().with_probe(disk.clone());
        let (a, _) = registry.ingest(Utf8Path::new(A1));
        registry.ingest(Utf8Path::new(A2));
        let (b, _) = registry.ingest(Utf8Path::new(B1));

        let before_b = registry.extant_count(b);
        disk.delete(A2);
        let removal = registry.remove_member(a, Utf8Path::new(A2)).unwrap();

        assert_eq!(
            removal,
            Removal {
                removed: true,
                extant: 2,
                resolved: false,
            }
        );
        assert!(!registry.get(a).unwrap().contains(Utf8Path::new(A2)));
        assert_eq!(registry.extant_count(b), before_b);
    }

    #[test]
    fn test_remove_member_resolves_group() {
        let disk = FakeDisk::with(&["/sync/a.txt", A1]);
        let mut registry = SibshipRegistry::new().with_probe(disk.clone());
        let (a, _) = registry.ingest(Utf8Path::new(A1));

        disk.delete(A1);
        let removal = registry.remove_member(a, Utf8Path::new(A1)).unwrap();
        assert!(removal.removed);
        assert_eq!(removal.extant, 1);
        assert!(removal.resolved);

        // The registry keeps resolved sibships around.
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.unresolved().count(), 0);
    }

    #[test]
    fn test_remove_member_not_present() {
        let mut registry = SibshipRegistry::new().with_probe(FakeDisk::default());
        let (a, _) = registry.ingest(Utf8Path::new(A1));

        let removal = registry.remove_member(a, Utf8Path::new("/elsewhere.txt")).unwrap();
        assert!(!removal.removed);
        assert!(registry.remove_member(SibshipId(99), Utf8Path::new(A1)).is_none());
    }

    #[test]
    fn test_lookup_helpers() {
        let mut registry = SibshipRegistry::new().with_probe(FakeDisk::default());
        assert!(registry.is_empty());

        let (a, _) = registry.ingest(Utf8Path::new(A1));

        assert_eq!(
            registry.get_by_canonical(Utf8Path::new("/sync/a.txt")).map(Sibship::id),
            Some(a)
        );
        assert_eq!(registry.find_by_member(Utf8Path::new(A1)).map(Sibship::id), Some(a));
        assert!(registry.find_by_member(Utf8Path::new(A2)).is_none());
        assert_eq!(registry.iter().count(), 1);
        assert_eq!(a.to_string(), "#0");
    }

    #[test]
    fn test_unresolved_filters_by_extant_count() {
        let disk = FakeDisk::with(&["/sync/a.txt", A1, B1]);
        let mut registry = SibshipRegistry::new().with_probe(disk);
        let (a, _) = registry.ingest(Utf8Path::new(A1));
        registry.ingest(Utf8Path::new(B1));

        let unresolved: Vec<_> = registry.unresolved().map(Sibship::id).collect();
        assert_eq!(unresolved, vec![a]);
    }
}
