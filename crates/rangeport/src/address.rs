//! Spreadsheet-style address strings for 1-based value rectangles.

/// Convert a 1-based column number to spreadsheet column letters.
///
/// This is bijective base-26 with digits 1–26 (not 0–25): digit value 0 wraps
/// to 'Z' of the previous cycle, so 26 is "Z" and 27 is "AA", not "A0".
/// Returns an empty string for `column < 1`.
pub fn column_letters(column: u32) -> String {
    if column < 1 {
        return String::new();
    }
    let rest = (column - 1) / 26;
    let digit = (b'A' + ((column - 1) % 26) as u8) as char;
    let mut s = column_letters(rest);
    s.push(digit);
    s
}

/// Format a 1-based rectangle as an `"A1:C10"` style range string.
pub fn range_address(row: u32, column: u32, rows: u32, columns: u32) -> String {
    let begin = format!("{}{}", column_letters(column), row);
    let end = format!(
        "{}{}",
        column_letters(column + columns.saturating_sub(1)),
        row + rows.saturating_sub(1)
    );
    format!("{begin}:{end}")
}
