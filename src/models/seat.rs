use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Идентификатор места в зале: буква ряда + номер места ("C7").
///
/// Уникален только в пределах одного сеанса. Порядок сортировки: сначала ряд,
/// затем номер как число (A2 < A10 < B1).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeatId {
    row: char,
    number: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeatIdError {
    #[error("seat id is empty")]
    Empty,
    #[error("invalid row '{0}'")]
    InvalidRow(char),
    #[error("invalid seat number in '{0}'")]
    InvalidNumber(String),
}

impl SeatId {
    pub fn new(row: char, number: u16) -> Result<Self, SeatIdError> {
        let row = row.to_ascii_uppercase();
        if !row.is_ascii_uppercase() {
            return Err(SeatIdError::InvalidRow(row));
        }
        if number == 0 {
            return Err(SeatIdError::InvalidNumber(format!("{}{}", row, number)));
        }
        Ok(Self { row, number })
    }

    pub fn row(&self) -> char {
        self.row
    }

    pub fn number(&self) -> u16 {
        self.number
    }
}

impl FromStr for SeatId {
    type Err = SeatIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let row = chars.next().ok_or(SeatIdError::Empty)?;
        let digits = chars.as_str();

        // Без ведущих нулей: "A07" и "A7" не должны считаться разными местами
        if digits.is_empty()
            || digits.starts_with('0')
            || !digits.chars().all(|c| c.is_ascii_digit())
        {
            return Err(SeatIdError::InvalidNumber(s.to_string()));
        }
        let number = digits
            .parse::<u16>()
            .map_err(|_| SeatIdError::InvalidNumber(s.to_string()))?;

        SeatId::new(row, number)
    }
}

impl TryFrom<String> for SeatId {
    type Error = SeatIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SeatId> for String {
    fn from(seat: SeatId) -> Self {
        seat.to_string()
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.number)
    }
}

/// Статическая схема зала, общая для всех сеансов.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatMap {
    rows: Vec<char>,
    seats_per_row: u16,
}

impl SeatMap {
    pub const DEFAULT_ROWS: &'static str = "ABCDEFGH";
    pub const DEFAULT_SEATS_PER_ROW: u16 = 12;

    /// Строит схему из строки букв рядов. Дубликаты и не-буквы отбрасываются.
    pub fn new(rows: &str, seats_per_row: u16) -> Self {
        let mut parsed: Vec<char> = Vec::new();
        for c in rows.chars().map(|c| c.to_ascii_uppercase()) {
            if c.is_ascii_uppercase() && !parsed.contains(&c) {
                parsed.push(c);
            }
        }
        Self { rows: parsed, seats_per_row }
    }

    pub fn rows(&self) -> &[char] {
        &self.rows
    }

    pub fn seats_per_row(&self) -> u16 {
        self.seats_per_row
    }

    pub fn capacity(&self) -> usize {
        self.rows.len() * self.seats_per_row as usize
    }

    pub fn contains(&self, seat: &SeatId) -> bool {
        self.rows.contains(&seat.row()) && seat.number() <= self.seats_per_row
    }

    /// Все места схемы в порядке отображения.
    pub fn seats(&self) -> impl Iterator<Item = SeatId> + '_ {
        self.rows.iter().flat_map(move |&row| {
            (1..=self.seats_per_row).map(move |number| SeatId { row, number })
        })
    }
}

impl Default for SeatMap {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ROWS, Self::DEFAULT_SEATS_PER_ROW)
    }
}
