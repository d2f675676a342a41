//! Fixed number attribute tables for the 49-ball game.
//!
//! The zodiac table rotates every lunar year in the real game. The tables
//! below hold the Year of the Snake (2025) assignment and are kept as
//! constants; a new year means a new table, not a computation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MIN_NUMBER: u8 = 1;
pub const MAX_NUMBER: u8 = 49;
pub const NUMBER_COUNT: usize = 49;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} name: {name}")]
pub struct UnknownCategory {
    pub kind: &'static str,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Zodiac {
    Rat,
    Ox,
    Tiger,
    Rabbit,
    Dragon,
    Snake,
    Horse,
    Goat,
    Monkey,
    Rooster,
    Dog,
    Pig,
}

/// Zodiac assignment for the Year of the Snake (2025).
pub const ZODIAC_TABLE: [(Zodiac, &[u8]); 12] = [
    (Zodiac::Rat, &[6, 18, 30, 42]),
    (Zodiac::Ox, &[5, 17, 29, 41]),
    (Zodiac::Tiger, &[4, 16, 28, 40]),
    (Zodiac::Rabbit, &[3, 15, 27, 39]),
    (Zodiac::Dragon, &[2, 14, 26, 38]),
    (Zodiac::Snake, &[1, 13, 25, 37, 49]),
    (Zodiac::Horse, &[12, 24, 36, 48]),
    (Zodiac::Goat, &[11, 23, 35, 47]),
    (Zodiac::Monkey, &[10, 22, 34, 46]),
    (Zodiac::Rooster, &[9, 21, 33, 45]),
    (Zodiac::Dog, &[8, 20, 32, 44]),
    (Zodiac::Pig, &[7, 19, 31, 43]),
];

impl Zodiac {
    pub const ALL: [Zodiac; 12] = [
        Zodiac::Rat,
        Zodiac::Ox,
        Zodiac::Tiger,
        Zodiac::Rabbit,
        Zodiac::Dragon,
        Zodiac::Snake,
        Zodiac::Horse,
        Zodiac::Goat,
        Zodiac::Monkey,
        Zodiac::Rooster,
        Zodiac::Dog,
        Zodiac::Pig,
    ];

    pub fn numbers(self) -> &'static [u8] {
        ZODIAC_TABLE[self as usize].1
    }

    pub fn chinese_name(self) -> &'static str {
        match self {
            Zodiac::Rat => "鼠",
            Zodiac::Ox => "牛",
            Zodiac::Tiger => "虎",
            Zodiac::Rabbit => "兔",
            Zodiac::Dragon => "龙",
            Zodiac::Snake => "蛇",
            Zodiac::Horse => "马",
            Zodiac::Goat => "羊",
            Zodiac::Monkey => "猴",
            Zodiac::Rooster => "鸡",
            Zodiac::Dog => "狗",
            Zodiac::Pig => "猪",
        }
    }
}

impl fmt::Display for Zodiac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for Zodiac {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Zodiac::ALL
            .into_iter()
            .find(|z| z.chinese_name() == name || z.to_string().eq_ignore_ascii_case(name))
            .or_else(|| match name.to_ascii_lowercase().as_str() {
                "sheep" => Some(Zodiac::Goat),
                "chicken" => Some(Zodiac::Rooster),
                _ => None,
            })
            .ok_or_else(|| UnknownCategory {
                kind: "zodiac",
                name: name.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Color {
    Red,
    Blue,
    Green,
}

pub const RED_NUMBERS: [u8; 17] = [
    1, 2, 7, 8, 12, 13, 18, 19, 23, 24, 29, 30, 34, 35, 40, 45, 46,
];
pub const BLUE_NUMBERS: [u8; 16] = [3, 4, 9, 10, 14, 15, 20, 25, 26, 31, 36, 37, 41, 42, 47, 48];
pub const GREEN_NUMBERS: [u8; 16] = [5, 6, 11, 16, 17, 21, 22, 27, 28, 32, 33, 38, 39, 43, 44, 49];

impl Color {
    pub const ALL: [Color; 3] = [Color::Red, Color::Blue, Color::Green];

    pub fn numbers(self) -> &'static [u8] {
        match self {
            Color::Red => &RED_NUMBERS,
            Color::Blue => &BLUE_NUMBERS,
            Color::Green => &GREEN_NUMBERS,
        }
    }

    pub fn chinese_name(self) -> &'static str {
        match self {
            Color::Red => "红",
            Color::Blue => "蓝",
            Color::Green => "绿",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for Color {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Color::ALL
            .into_iter()
            .find(|c| {
                name == c.chinese_name()
                    || name == format!("{}波", c.chinese_name())
                    || c.to_string().eq_ignore_ascii_case(name)
            })
            .ok_or_else(|| UnknownCategory {
                kind: "color",
                name: name.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Size {
    Small,
    Large,
}

impl FromStr for Size {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" | "小" | "合小" | "尾小" => Ok(Size::Small),
            "large" | "big" | "大" | "合大" | "尾大" => Ok(Size::Large),
            other => Err(UnknownCategory {
                kind: "size",
                name: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Parity {
    Odd,
    Even,
}

impl Parity {
    fn of(value: u8) -> Parity {
        if value % 2 == 1 { Parity::Odd } else { Parity::Even }
    }
}

impl FromStr for Parity {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "odd" | "单" | "合单" => Ok(Parity::Odd),
            "even" | "双" | "合双" => Ok(Parity::Even),
            other => Err(UnknownCategory {
                kind: "parity",
                name: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NumberAttributes {
    pub number: u8,
    pub zodiac: Zodiac,
    pub color: Color,
    pub digit_sum: u8,
    pub last_digit: u8,
    pub size: Size,
    pub parity: Parity,
}

pub fn is_valid_number(number: u8) -> bool {
    (MIN_NUMBER..=MAX_NUMBER).contains(&number)
}

pub fn zodiac_of(number: u8) -> Option<Zodiac> {
    ZODIAC_TABLE
        .iter()
        .find(|(_, numbers)| numbers.contains(&number))
        .map(|(zodiac, _)| *zodiac)
}

pub fn color_of(number: u8) -> Option<Color> {
    Color::ALL
        .into_iter()
        .find(|color| color.numbers().contains(&number))
}

/// Repeated digit sum: 10 -> 1, 28 -> 1, 49 -> 4.
pub fn digit_sum_of(number: u8) -> Option<u8> {
    is_valid_number(number).then(|| 1 + (number - 1) % 9)
}

pub fn last_digit_of(number: u8) -> Option<u8> {
    is_valid_number(number).then_some(number % 10)
}

pub fn size_of(number: u8) -> Option<Size> {
    is_valid_number(number).then(|| if number <= 24 { Size::Small } else { Size::Large })
}

pub fn parity_of(number: u8) -> Option<Parity> {
    is_valid_number(number).then(|| Parity::of(number))
}

/// Small for digit sums 1-4, large for 5-9.
pub fn sum_size_of(number: u8) -> Option<Size> {
    digit_sum_of(number).map(|sum| if sum <= 4 { Size::Small } else { Size::Large })
}

pub fn sum_parity_of(number: u8) -> Option<Parity> {
    digit_sum_of(number).map(Parity::of)
}

/// Small for last digits 0-4, large for 5-9.
pub fn tail_size_of(number: u8) -> Option<Size> {
    last_digit_of(number).map(|tail| if tail <= 4 { Size::Small } else { Size::Large })
}

pub fn attributes_of(number: u8) -> Option<NumberAttributes> {
    Some(NumberAttributes {
        number,
        zodiac: zodiac_of(number)?,
        color: color_of(number)?,
        digit_sum: digit_sum_of(number)?,
        last_digit: last_digit_of(number)?,
        size: size_of(number)?,
        parity: parity_of(number)?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Zodiac(Zodiac),
    Color(Color),
    DigitSum(u8),
    LastDigit(u8),
    Size(Size),
    Parity(Parity),
    SumParity(Parity),
    SumSize(Size),
    TailSize(Size),
}

pub fn numbers_by_attribute(attribute: Attribute) -> Vec<u8> {
    (MIN_NUMBER..=MAX_NUMBER)
        .filter(|&n| match attribute {
            Attribute::Zodiac(z) => zodiac_of(n) == Some(z),
            Attribute::Color(c) => color_of(n) == Some(c),
            Attribute::DigitSum(s) => digit_sum_of(n) == Some(s),
            Attribute::LastDigit(d) => last_digit_of(n) == Some(d),
            Attribute::Size(s) => size_of(n) == Some(s),
            Attribute::Parity(p) => parity_of(n) == Some(p),
            Attribute::SumParity(p) => sum_parity_of(n) == Some(p),
            Attribute::SumSize(s) => sum_size_of(n) == Some(s),
            Attribute::TailSize(s) => tail_size_of(n) == Some(s),
        })
        .collect()
}

/// A fixed group of numbers a bet can select as a whole.
pub trait Category: Copy + Ord + fmt::Debug + 'static {
    fn all() -> &'static [Self];
    fn numbers(self) -> &'static [u8];
    fn of(number: u8) -> Option<Self>;
}

impl Category for Zodiac {
    fn all() -> &'static [Self] {
        &Zodiac::ALL
    }

    fn numbers(self) -> &'static [u8] {
        Zodiac::numbers(self)
    }

    fn of(number: u8) -> Option<Self> {
        zodiac_of(number)
    }
}

impl Category for Color {
    fn all() -> &'static [Self] {
        &Color::ALL
    }

    fn numbers(self) -> &'static [u8] {
        Color::numbers(self)
    }

    fn of(number: u8) -> Option<Self> {
        color_of(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zodiac_table_partitions_all_numbers() {
        let mut seen = Vec::new();
        for zodiac in Zodiac::ALL {
            let numbers = zodiac.numbers();
            assert!(numbers.len() == 4 || numbers.len() == 5, "{:?}", zodiac);
            seen.extend_from_slice(numbers);
        }
        seen.sort();
        assert_eq!(seen, (1..=49).collect::<Vec<u8>>());
    }

    #[test]
    fn test_color_table_partitions_all_numbers() {
        let mut seen: Vec<u8> = Color::ALL.iter().flat_map(|c| c.numbers().to_vec()).collect();
        seen.sort();
        assert_eq!(seen, (1..=49).collect::<Vec<u8>>());
        assert_eq!(Color::Red.numbers().len(), 17);
        assert_eq!(Color::Blue.numbers().len(), 16);
        assert_eq!(Color::Green.numbers().len(), 16);
    }

    #[test]
    fn test_attributes_of_known_numbers() {
        let attrs = attributes_of(49).unwrap();
        assert_eq!(attrs.zodiac, Zodiac::Snake);
        assert_eq!(attrs.color, Color::Green);
        assert_eq!(attrs.digit_sum, 4);
        assert_eq!(attrs.last_digit, 9);
        assert_eq!(attrs.size, Size::Large);
        assert_eq!(attrs.parity, Parity::Odd);

        let attrs = attributes_of(24).unwrap();
        assert_eq!(attrs.zodiac, Zodiac::Horse);
        assert_eq!(attrs.color, Color::Red);
        assert_eq!(attrs.digit_sum, 6);
        assert_eq!(attrs.last_digit, 4);
        assert_eq!(attrs.size, Size::Small);
        assert_eq!(attrs.parity, Parity::Even);
    }

    #[test]
    fn test_digit_sum_matches_reference_rows() {
        let expected = [(1, 1), (9, 9), (10, 1), (19, 1), (28, 1), (37, 1), (46, 1), (30, 3), (48, 3)];
        for (number, sum) in expected {
            assert_eq!(digit_sum_of(number), Some(sum), "number {}", number);
        }
    }

    #[test]
    fn test_out_of_range_has_no_attributes() {
        assert!(attributes_of(0).is_none());
        assert!(attributes_of(50).is_none());
        assert!(zodiac_of(0).is_none());
        assert!(color_of(99).is_none());
        assert!(last_digit_of(50).is_none());
    }

    #[test]
    fn test_parse_names_in_both_languages() {
        assert_eq!("鼠".parse::<Zodiac>().unwrap(), Zodiac::Rat);
        assert_eq!("ox".parse::<Zodiac>().unwrap(), Zodiac::Ox);
        assert_eq!("Sheep".parse::<Zodiac>().unwrap(), Zodiac::Goat);
        assert_eq!("红".parse::<Color>().unwrap(), Color::Red);
        assert_eq!("绿波".parse::<Color>().unwrap(), Color::Green);
        assert_eq!("BLUE".parse::<Color>().unwrap(), Color::Blue);
        assert_eq!("合单".parse::<Parity>().unwrap(), Parity::Odd);
        assert_eq!("尾大".parse::<Size>().unwrap(), Size::Large);
        assert!("unicorn".parse::<Zodiac>().is_err());
    }

    #[test]
    fn test_numbers_by_attribute() {
        assert_eq!(numbers_by_attribute(Attribute::Zodiac(Zodiac::Rat)), vec![6, 18, 30, 42]);
        assert_eq!(numbers_by_attribute(Attribute::LastDigit(0)), vec![10, 20, 30, 40]);
        assert_eq!(numbers_by_attribute(Attribute::Size(Size::Small)).len(), 24);
        assert_eq!(numbers_by_attribute(Attribute::Parity(Parity::Odd)).len(), 25);
        assert_eq!(numbers_by_attribute(Attribute::DigitSum(1)), vec![1, 10, 19, 28, 37, 46]);
    }
}
