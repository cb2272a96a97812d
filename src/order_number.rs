// checks order number format: ascii digits only, luhn mod-10 checksum
pub fn is_valid(number: &str) -> bool {
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let sum: u32 = number
        .bytes()
        .rev()
        .enumerate()
        .map(|(idx, b)| {
            let digit = u32::from(b - b'0');
            if idx % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                digit
            }
        })
        .sum();

    sum % 10 == 0
}
