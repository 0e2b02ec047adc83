use serde::{Deserialize, Serialize};

use super::{group::group_weight, LandmarkGroup, ParametricLandmark};
use crate::{Real, Vec3};

/// Handle of a landmark inside a [`LandmarkStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LandmarkId(pub usize);

/// Handle of a group inside a [`LandmarkStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub usize);

impl std::fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Group metadata with handles to its landmarks.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRecord {
    pub id: String,
    pub height: Real,
    pub radius: Real,
    pub landmarks: Vec<LandmarkId>,
}

impl GroupRecord {
    pub fn weight(&self) -> Real {
        group_weight(self.landmarks.len())
    }
}

/// Saved landmark parameters, restored between solve attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSnapshot(Vec<(Real, Real)>);

/// Arena owning every landmark; groups refer to landmarks by [`LandmarkId`].
#[derive(Debug, Clone, Default)]
pub struct LandmarkStore {
    landmarks: Vec<ParametricLandmark>,
    owners: Vec<GroupId>,
    groups: Vec<GroupRecord>,
}

impl LandmarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a group into the arena.
    pub fn insert_group(&mut self, group: LandmarkGroup) -> GroupId {
        let group_id = GroupId(self.groups.len());
        let mut handles = Vec::with_capacity(group.points.len());
        for point in group.points {
            handles.push(LandmarkId(self.landmarks.len()));
            self.landmarks.push(point);
            self.owners.push(group_id);
        }
        self.groups.push(GroupRecord {
            id: group.id,
            height: group.height,
            radius: group.radius,
            landmarks: handles,
        });
        group_id
    }

    pub fn clear(&mut self) {
        self.landmarks.clear();
        self.owners.clear();
        self.groups.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn landmark_count(&self) -> usize {
        self.landmarks.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn landmark(&self, id: LandmarkId) -> Option<&ParametricLandmark> {
        self.landmarks.get(id.0)
    }

    pub fn landmark_mut(&mut self, id: LandmarkId) -> Option<&mut ParametricLandmark> {
        self.landmarks.get_mut(id.0)
    }

    pub fn group(&self, id: GroupId) -> Option<&GroupRecord> {
        self.groups.get(id.0)
    }

    /// Group owning a landmark.
    pub fn owner(&self, id: LandmarkId) -> Option<GroupId> {
        self.owners.get(id.0).copied()
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &GroupRecord)> {
        self.groups.iter().enumerate().map(|(i, g)| (GroupId(i), g))
    }

    pub fn landmarks(&self) -> impl Iterator<Item = (LandmarkId, &ParametricLandmark)> {
        self.landmarks.iter().enumerate().map(|(i, l)| (LandmarkId(i), l))
    }

    /// Landmarks carrying an expected pixel, with their owning group.
    pub fn observed(&self) -> impl Iterator<Item = (GroupId, LandmarkId, &ParametricLandmark)> {
        self.landmarks()
            .filter(|(_, l)| l.has_expected_pixel())
            .map(|(id, l)| (self.owners[id.0], id, l))
    }

    pub fn observed_count(&self) -> usize {
        self.landmarks.iter().filter(|l| l.has_expected_pixel()).count()
    }

    /// Mean of all landmark positions, `None` when the store is empty.
    pub fn mean_position(&self) -> Option<Vec3> {
        if self.landmarks.is_empty() {
            return None;
        }
        let sum = self.landmarks.iter().fold(Vec3::zeros(), |acc, l| acc + l.position());
        Some(sum / self.landmarks.len() as Real)
    }

    /// Landmark position furthest from `point`.
    pub fn furthest_from(&self, point: &Vec3) -> Option<Vec3> {
        self.landmarks
            .iter()
            .map(|l| l.position())
            .max_by(|a, b| (a - point).norm().total_cmp(&(b - point).norm()))
    }

    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot(self.landmarks.iter().map(|l| (l.lambda(), l.mu())).collect())
    }

    /// Restore parameters saved by [`Self::snapshot`]; extra entries are ignored.
    pub fn restore(&mut self, snapshot: &ParameterSnapshot) {
        for (landmark, &(lambda, mu)) in self.landmarks.iter_mut().zip(&snapshot.0) {
            landmark.set_parameters(lambda, mu);
        }
    }

    /// Rebuild owned groups with the current landmark parameters.
    pub fn to_groups(&self) -> Vec<LandmarkGroup> {
        self.groups
            .iter()
            .map(|g| LandmarkGroup {
                id: g.id.clone(),
                points: g.landmarks.iter().map(|id| self.landmarks[id.0].clone()).collect(),
                height: g.height,
                radius: g.radius,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vec2;

    fn store() -> LandmarkStore {
        let mut store = LandmarkStore::new();
        store.insert_group(
            LandmarkGroup::new("a")
                .with_height(4.0)
                .with_point(ParametricLandmark::on_line(Vec3::zeros(), Vec3::z(), 1.0))
                .with_point(ParametricLandmark::on_point(Vec3::new(4.0, 0.0, 0.0)).with_expected_pixel(Vec2::zeros())),
        );
        store.insert_group(
            LandmarkGroup::new("b").with_point(
                ParametricLandmark::on_point(Vec3::new(-2.0, 3.0, 0.0)).with_expected_pixel(Vec2::new(1.0, 1.0)),
            ),
        );
        store
    }

    #[test]
    fn handles_map_back_to_groups() {
        let store = store();
        assert_eq!(store.landmark_count(), 3);
        assert_eq!(store.group_count(), 2);
        assert_eq!(store.owner(LandmarkId(2)), Some(GroupId(1)));
        assert_eq!(store.group(GroupId(0)).unwrap().landmarks, vec![LandmarkId(0), LandmarkId(1)]);
        assert_eq!(store.group(GroupId(0)).unwrap().weight(), 0.5);

        let observed: Vec<_> = store.observed().map(|(g, l, _)| (g, l)).collect();
        assert_eq!(observed, vec![(GroupId(0), LandmarkId(1)), (GroupId(1), LandmarkId(2))]);
    }

    #[test]
    fn mean_and_furthest_point() {
        let store = store();
        let mean = store.mean_position().unwrap();
        assert!((mean - Vec3::new(2.0 / 3.0, 1.0, 1.0 / 3.0)).norm() < 1e-12);
        assert_eq!(store.furthest_from(&mean), Some(Vec3::new(4.0, 0.0, 0.0)));
        assert!(LandmarkStore::new().mean_position().is_none());
    }

    #[test]
    fn snapshot_restores_parameters() {
        let mut store = store();
        let saved = store.snapshot();
        store.landmark_mut(LandmarkId(0)).unwrap().set_parameters(3.0, 0.0);
        assert_eq!(store.to_groups()[0].points[0].position(), Vec3::new(0.0, 0.0, 3.0));
        store.restore(&saved);
        assert_eq!(store.landmark(LandmarkId(0)).unwrap().lambda(), 1.0);
    }

    #[test]
    fn groups_round_trip_through_arena() {
        let store = store();
        let groups = store.to_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].id, "a");
        assert_eq!(groups[0].height, 4.0);
        assert_eq!(groups[1].points.len(), 1);

        let mut cleared = store.clone();
        cleared.clear();
        assert!(cleared.is_empty());
        assert_eq!(cleared.group_count(), 0);
    }
}
