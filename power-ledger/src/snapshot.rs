use crate::{Error, Height, Power};
use serde::{Deserialize, Serialize};

/// Power held by an account from `height` until the next snapshot.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub height: Height,
    pub value: Power,
}

/// Append-only power history of one account for one power kind, ordered by
/// strictly increasing height.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct SnapshotHistory(Vec<Snapshot>);

impl SnapshotHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Snapshot> {
        self.0.last()
    }

    pub fn as_slice(&self) -> &[Snapshot] {
        &self.0
    }

    /// Records `value` at `height`. A write at the height of the last snapshot
    /// overwrites it instead of appending, a write below it is rejected.
    pub fn write(&mut self, height: Height, value: Power) -> Result<(), Error> {
        match self.0.last_mut() {
            Some(last) if last.height == height => last.value = value,
            Some(last) if last.height > height => {
                return Err(Error::ClockRegression {
                    height,
                    last: last.height,
                })
            }
            _ => self.0.push(Snapshot { height, value }),
        }
        Ok(())
    }

    /// Power in force at `height`, or `None` if nothing was ever recorded.
    pub fn value_at(&self, height: Height) -> Option<Power> {
        let (first, last) = (self.0.first()?, self.0.last()?);

        if last.height <= height {
            return Some(last.value);
        }
        if first.height > height {
            return Some(0);
        }

        // Ceiling midpoint: with `lower = mid` on the low branch a floor
        // midpoint would never advance once `upper == lower + 1`.
        let mut lower = 0;
        let mut upper = self.0.len() - 1;
        while upper > lower {
            let mid = upper - (upper - lower) / 2;
            if self.0[mid].height > height {
                upper = mid - 1;
            } else {
                lower = mid;
            }
        }
        Some(self.0[lower].value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_strategy::proptest;

    fn history(points: &[(Height, Power)]) -> SnapshotHistory {
        let mut history = SnapshotHistory::new();
        for &(height, value) in points {
            history.write(height, value).unwrap();
        }
        history
    }

    #[test]
    fn point_queries() {
        let history = history(&[(10, 100), (20, 50), (30, 200)]);
        assert_eq!(history.value_at(5), Some(0));
        assert_eq!(history.value_at(10), Some(100));
        assert_eq!(history.value_at(15), Some(100));
        assert_eq!(history.value_at(20), Some(50));
        assert_eq!(history.value_at(29), Some(50));
        assert_eq!(history.value_at(30), Some(200));
        assert_eq!(history.value_at(100), Some(200));
    }

    #[test]
    fn empty_history_has_no_value() {
        assert_eq!(SnapshotHistory::new().value_at(0), None);
        assert_eq!(SnapshotHistory::new().value_at(Height::MAX), None);
    }

    #[test]
    fn same_height_overwrites() {
        let history = history(&[(1, 10), (2, 20), (2, 25), (2, 30)]);
        assert_eq!(
            history.as_slice(),
            &[
                Snapshot {
                    height: 1,
                    value: 10
                },
                Snapshot {
                    height: 2,
                    value: 30
                }
            ]
        );
    }

    #[test]
    fn lower_height_is_rejected() {
        let mut history = history(&[(10, 100), (20, 50)]);
        assert_eq!(
            history.write(15, 70),
            Err(Error::ClockRegression {
                height: 15,
                last: 20
            })
        );
        assert_eq!(history.len(), 2);
        assert_eq!(history.value_at(15), Some(100));
    }

    #[test]
    fn two_adjacent_snapshots() {
        let history = history(&[(4, 1), (5, 2)]);
        assert_eq!(history.value_at(3), Some(0));
        assert_eq!(history.value_at(4), Some(1));
        assert_eq!(history.value_at(5), Some(2));
    }

    fn writes() -> impl Strategy<Value = Vec<(Height, Power)>> {
        proptest::collection::vec((0..4u128, any::<u64>()), 1..64).prop_map(|steps| {
            let mut height = 0;
            steps
                .into_iter()
                .map(|(advance, value)| {
                    height += advance;
                    (height, value as Power)
                })
                .collect()
        })
    }

    #[proptest]
    fn heights_strictly_increase(#[strategy(writes())] points: Vec<(Height, Power)>) {
        let history = history(&points);
        assert!(history
            .as_slice()
            .windows(2)
            .all(|pair| pair[0].height < pair[1].height));
    }

    #[proptest]
    fn binary_search_matches_linear_scan(
        #[strategy(writes())] points: Vec<(Height, Power)>,
        #[strategy(0..300u128)] query: Height,
    ) {
        let history = history(&points);
        let expected = history
            .as_slice()
            .iter()
            .rev()
            .find(|s| s.height <= query)
            .map_or(0, |s| s.value);
        assert_eq!(history.value_at(query), Some(expected));
    }
}
