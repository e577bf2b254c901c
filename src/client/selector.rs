//! Выбор мест на клиенте.
//!
//! Пользователь выбирает ровно K мест. Занятые места не выбираются; при
//! переполнении вытесняется самое старое из выбранных. Это лишь подсказка
//! интерфейсу: окончательно конфликт решается при оплате.

use std::collections::{BTreeSet, VecDeque};

use crate::models::{SeatId, SeatMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Selected,
    Deselected,
    /// Место выбрано, самое старое вытеснено.
    Replaced { evicted: SeatId },
    /// Место занято, вне схемы или K = 0.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct SeatSelector {
    seat_map: SeatMap,
    capacity: usize,
    // В порядке выбора, нужен для вытеснения
    selected: VecDeque<SeatId>,
    taken: BTreeSet<SeatId>,
}

impl SeatSelector {
    pub fn new(seat_map: SeatMap, capacity: usize) -> Self {
        Self {
            seat_map,
            capacity,
            selected: VecDeque::with_capacity(capacity),
            taken: BTreeSet::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_taken(&self, seat: &SeatId) -> bool {
        self.taken.contains(seat)
    }

    pub fn is_selected(&self, seat: &SeatId) -> bool {
        self.selected.contains(seat)
    }

    pub fn is_complete(&self) -> bool {
        self.capacity > 0 && self.selected.len() == self.capacity
    }

    pub fn toggle(&mut self, seat: SeatId) -> ToggleOutcome {
        if self.capacity == 0 || self.is_taken(&seat) || !self.seat_map.contains(&seat) {
            return ToggleOutcome::Ignored;
        }

        if let Some(pos) = self.selected.iter().position(|s| *s == seat) {
            self.selected.remove(pos);
            return ToggleOutcome::Deselected;
        }

        let evicted = if self.selected.len() >= self.capacity {
            self.selected.pop_front()
        } else {
            None
        };
        self.selected.push_back(seat);

        match evicted {
            Some(evicted) => ToggleOutcome::Replaced { evicted },
            None => ToggleOutcome::Selected,
        }
    }

    /// Выбор в порядке отображения: ряд, затем номер.
    pub fn current_selection(&self) -> Vec<SeatId> {
        let mut seats: Vec<SeatId> = self.selected.iter().cloned().collect();
        seats.sort();
        seats
    }

    /// Принимает свежий снимок занятых мест. Возвращает места, выпавшие из выбора.
    pub fn apply_snapshot<I>(&mut self, taken: I) -> Vec<SeatId>
    where
        I: IntoIterator<Item = SeatId>,
    {
        self.taken = taken.into_iter().collect();
        let mut dropped = Vec::new();
        let taken = &self.taken;
        self.selected.retain(|seat| {
            if taken.contains(seat) {
                dropped.push(seat.clone());
                false
            } else {
                true
            }
        });
        dropped
    }

    /// Меняет K. При уменьшении вытесняются самые старые места.
    pub fn set_capacity(&mut self, capacity: usize) -> Vec<SeatId> {
        self.capacity = capacity;
        let excess = self.selected.len().saturating_sub(capacity);
        self.selected.drain(..excess).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn seat(s: &str) -> SeatId {
        s.parse().unwrap()
    }

    #[test]
    fn fifo_eviction_keeps_newest() {
        let mut selector = SeatSelector::new(SeatMap::default(), 2);
        assert_eq!(selector.toggle(seat("A1")), ToggleOutcome::Selected);
        assert_eq!(selector.toggle(seat("A2")), ToggleOutcome::Selected);
        assert_eq!(
            selector.toggle(seat("A3")),
            ToggleOutcome::Replaced { evicted: seat("A1") }
        );
        assert_eq!(selector.current_selection(), vec![seat("A2"), seat("A3")]);
    }

    #[test]
    fn eviction_follows_selection_order_not_display_order() {
        let mut selector = SeatSelector::new(SeatMap::default(), 2);
        selector.toggle(seat("C9"));
        selector.toggle(seat("A1"));
        selector.toggle(seat("B5"));
        assert_eq!(selector.current_selection(), vec![seat("A1"), seat("B5")]);
    }

    #[test]
    fn toggling_selected_seat_removes_it() {
        let mut selector = SeatSelector::new(SeatMap::default(), 3);
        selector.toggle(seat("D4"));
        assert_eq!(selector.toggle(seat("D4")), ToggleOutcome::Deselected);
        assert!(selector.current_selection().is_empty());
    }

    #[test]
    fn taken_off_map_and_zero_capacity_are_ignored() {
        let mut selector = SeatSelector::new(SeatMap::default(), 2);
        selector.apply_snapshot(vec![seat("C8")]);
        assert_eq!(selector.toggle(seat("C8")), ToggleOutcome::Ignored);
        assert_eq!(selector.toggle(seat("J1")), ToggleOutcome::Ignored);
        assert_eq!(selector.toggle(seat("A13")), ToggleOutcome::Ignored);

        let mut empty = SeatSelector::new(SeatMap::default(), 0);
        assert_eq!(empty.toggle(seat("A1")), ToggleOutcome::Ignored);
        assert!(!empty.is_complete());
    }

    #[test]
    fn snapshot_drops_newly_taken_seats() {
        let mut selector = SeatSelector::new(SeatMap::default(), 3);
        selector.toggle(seat("C7"));
        selector.toggle(seat("C8"));
        let dropped = selector.apply_snapshot(vec![seat("C8"), seat("C9")]);
        assert_eq!(dropped, vec![seat("C8")]);
        assert_eq!(selector.current_selection(), vec![seat("C7")]);
        assert!(!selector.is_complete());
    }

    #[test]
    fn shrinking_capacity_evicts_oldest() {
        let mut selector = SeatSelector::new(SeatMap::default(), 3);
        for s in ["E3", "E1", "E2"] {
            selector.toggle(seat(s));
        }
        assert!(selector.is_complete());
        assert_eq!(selector.set_capacity(1), vec![seat("E3"), seat("E1")]);
        assert_eq!(selector.current_selection(), vec![seat("E2")]);
    }

    fn any_seat() -> impl Strategy<Value = SeatId> {
        // Немного шире схемы по умолчанию, чтобы задеть места вне зала
        (0u8..10, 1u16..15).prop_map(|(row, number)| SeatId::new((b'A' + row) as char, number).unwrap())
    }

    proptest! {
        #[test]
        fn selection_never_exceeds_capacity_or_contains_taken(
            capacity in 0usize..5,
            taken in proptest::collection::vec(any_seat(), 0..20),
            clicks in proptest::collection::vec(any_seat(), 0..60),
            refresh in proptest::collection::vec(any_seat(), 0..20),
        ) {
            let map = SeatMap::default();
            let mut selector = SeatSelector::new(map.clone(), capacity);
            selector.apply_snapshot(taken.clone());

            for (i, click) in clicks.into_iter().enumerate() {
                selector.toggle(click);
                if i == 30 {
                    selector.apply_snapshot(refresh.clone());
                }

                let current = selector.current_selection();
                prop_assert!(current.len() <= capacity);
                let unique: BTreeSet<_> = current.iter().collect();
                prop_assert_eq!(unique.len(), current.len());
                for s in &current {
                    prop_assert!(!selector.is_taken(s));
                    prop_assert!(map.contains(s));
                }
                prop_assert!(current.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }
}
