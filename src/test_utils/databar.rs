//! GS1 DataBar fixture rows.
//!
//! Rows start with a light element; a symbol row is framed by the one
//! module guards.

use crate::decoder::databar::expanded::pair_elements;
use crate::decoder::databar::omni::{
    finders_for_checksum, inside_character, inside_widths, outside_character, outside_widths,
    FINDER_PATTERNS, LEFT_RADIX, PAIR_RADIX,
};

/// Element widths of a left pair carrying `value`, and its checksum part
fn pair(value: u32) -> Option<(Vec<u32>, [u32; 8], u32)> {
    let outside = outside_widths(value / PAIR_RADIX)?;
    let inside = inside_widths(value % PAIR_RADIX)?;
    let checksum = outside_character(&outside)?.checksum_portion
        + 4 * inside_character(&inside)?.checksum_portion;
    Some((outside.to_vec(), inside, checksum))
}

fn finder(value: u8) -> Vec<u32> {
    FINDER_PATTERNS[value as usize].iter().map(|&m| m as u32).collect()
}

/// Left and right pairs of an Omnidirectional symbol for the 13 digits of
/// a GTIN-14 without its check digit, both in left-to-right order
pub fn omni_pairs(digits: &str) -> Option<(Vec<u32>, Vec<u32>)> {
    if digits.len() != 13 {
        return None;
    }
    let symbol: u64 = digits.parse().ok()?;
    let left_value = u32::try_from(symbol / LEFT_RADIX).ok()?;
    let right_value = u32::try_from(symbol % LEFT_RADIX).ok()?;
    let (mut left, left_inside, left_sum) = pair(left_value)?;
    let (right_outside, right_inside, right_sum) = pair(right_value)?;
    let (lf, rf) = finders_for_checksum((left_sum + 16 * right_sum) % 79);

    left.extend(finder(lf));
    left.extend(left_inside.iter().rev());

    // mirror image of a left pair
    let mut right = right_inside.to_vec();
    right.extend(finder(rf).iter().rev());
    right.extend(right_outside.iter().rev());
    Some((left, right))
}

/// Single-row symbol (Omnidirectional layout)
pub fn omni_row(digits: &str) -> Option<Vec<u32>> {
    let (left, right) = omni_pairs(digits)?;
    let mut row = vec![1, 1];
    row.extend(left);
    row.extend(right);
    row.extend([1, 1]);
    Some(row)
}

/// Top and bottom rows of a Stacked symbol
pub fn stacked_rows(digits: &str) -> Option<[Vec<u32>; 2]> {
    let (left, right) = omni_pairs(digits)?;
    let mut top = vec![1, 1];
    top.extend(left);
    top.extend([1, 1]);
    // one light module keeps the bottom row's inside character dark first
    let mut bottom = vec![1];
    bottom.extend(right);
    bottom.extend([1, 1]);
    Some([top, bottom])
}

/// Single-row Expanded symbol for 12-bit data character values
pub fn expanded_row(data: &[u32]) -> Option<Vec<u32>> {
    let pairs = pair_elements(data)?;
    let mut row = vec![1, 1];
    for p in pairs {
        row.extend(p);
    }
    row.extend([1, 1]);
    Some(row)
}

/// Data characters of an AI01 + 3103 element string: the GTIN-14 is
/// `9` + `digits` (twelve digits) + check digit, the weight in grams
pub fn ai01_3103_data(digits: &str, weight: u32) -> Option<Vec<u32>> {
    if digits.len() != 12 || weight > 32767 {
        return None;
    }
    let mut bits = Vec::new();
    let mut push = |value: u32, len: usize| {
        for i in (0..len).rev() {
            bits.push((value >> i) & 1 == 1);
        }
    };
    push(0b0_0100, 5);
    for group in digits.as_bytes().chunks(3) {
        let value = group.iter().fold(0u32, |acc, &d| acc * 10 + (d - b'0') as u32);
        push(value, 10);
    }
    push(weight, 15);
    Some(
        bits.chunks(12)
            .map(|c| c.iter().fold(0u32, |acc, &b| (acc << 1) | b as u32))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_widths() {
        let row = omni_row("0001234567890").expect("row");
        assert_eq!(row.len(), 46);
        assert_eq!(row.iter().sum::<u32>(), 96);
        let [top, bottom] = stacked_rows("0001234567890").expect("rows");
        assert_eq!(top.iter().sum::<u32>(), 50);
        assert_eq!(bottom.len() % 2, 0);
    }

    #[test]
    fn test_expanded_row_parity() {
        let data = ai01_3103_data("001234567890", 1750).expect("data");
        assert_eq!(data.len(), 5);
        let row = expanded_row(&data).expect("row");
        // guards plus 21 + 21 + 13 pair elements; the last guard space
        // joins the quiet zone
        assert_eq!(row.len(), 59);
    }
}
