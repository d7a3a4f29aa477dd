//! Lỗi chung và kết quả chèn có khử trùng lặp.

/// Lỗi chung của LCKB.
#[derive(Debug, thiserror::Error)]
pub enum LckbError {
    /// Không lấy được dữ liệu hồ sơ; người gọi dùng tài liệu rỗng thay thế.
    #[error("Không truy cập được nguồn dữ liệu hồ sơ: {0}")]
    SourceUnavailable(String),
    /// Kho lưu trữ từ chối ghi vì hết dung lượng, kể cả sau khi đã dọn bớt.
    #[error("Kho lưu trữ đã đầy, không ghi được khóa {key}")]
    PersistenceFull { key: String },
    /// Dữ liệu đã lưu bị hỏng hoặc không tương thích; cần dựng lại bằng build_full.
    #[error("Không giải mã được tài liệu đã lưu: {0}")]
    Deserialization(String),
    /// Sự kiện đầu vào thiếu trường bắt buộc.
    #[error("Sự kiện không hợp lệ: {0}")]
    InvalidEvent(String),
    /// Bảng luật chứa mẫu không biên dịch được.
    #[error("Luật không hợp lệ: {0}")]
    InvalidRule(String),
    #[error("Lỗi kho lưu trữ: {0}")]
    Store(String),
}

pub type LckbResult<T> = Result<T, LckbError>;

/// Kết quả của một thao tác chèn có khử trùng lặp.
///
/// `DuplicateIgnored` không phải lỗi: đó là giá trị trả về có chủ đích khi mục
/// đã tồn tại.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Insertion<T = ()> {
    Inserted(T),
    DuplicateIgnored,
}

impl<T> Insertion<T> {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Insertion::Inserted(_))
    }

    /// Giá trị đi kèm khi chèn thành công.
    pub fn inserted(self) -> Option<T> {
        match self {
            Insertion::Inserted(value) => Some(value),
            Insertion::DuplicateIgnored => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Insertion<U> {
        match self {
            Insertion::Inserted(value) => Insertion::Inserted(f(value)),
            Insertion::DuplicateIgnored => Insertion::DuplicateIgnored,
        }
    }
}

impl Insertion<()> {
    pub(crate) fn from_flag(inserted: bool) -> Self {
        if inserted {
            Insertion::Inserted(())
        } else {
            Insertion::DuplicateIgnored
        }
    }
}
