//! Tiện ích chuẩn hóa văn bản dùng cho khử trùng lặp.

/// Chuẩn hóa để so sánh: chữ thường, bỏ khoảng trắng thừa.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// So sánh hai chuỗi sau khi chuẩn hóa.
pub fn same_text(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Cắt chuỗi theo số ký tự (an toàn với Unicode), thêm "..." khi bị cắt.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// Hiển thị số gọn: 7.0 -> "7", 4.50 -> "4.5".
pub fn format_numeric(value: f64) -> String {
    if value.fract().abs() < f64::EPSILON {
        format!("{value:.0}")
    } else if ((value * 10.0).fract()).abs() < 1e-9 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Tách từ theo ký tự không phải chữ/số, chữ thường.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
