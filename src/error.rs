use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignVerifyError {
    #[error("Missing images")]
    MissingImages,

    #[error("No selected file")]
    NoSelectedFile,

    /// 拡張子が png/jpg/jpeg 以外（フィールドは元のファイル名）
    #[error("Unsupported file type")]
    UnsupportedFileType(String),

    #[error("マルチパート解析エラー: {0}")]
    Multipart(String),

    #[error("File too large")]
    PayloadTooLarge,

    /// `file` はファイル名のみ（サーバ側のディレクトリは含めない）
    #[error("画像読み込みエラー: {file}: {message}")]
    ImageDecode { file: String, message: String },

    #[error("Case study not found")]
    CaseStudyNotFound(String),

    #[error("ケースフォルダ名が不正: {0}")]
    InvalidCaseStudyName(String),

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("画像処理エラー: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Common(#[from] sign_verify_common::Error),

    #[error("ワーカー実行エラー: {0}")]
    Task(String),
}

impl SignVerifyError {
    /// HTTPステータスへの対応
    pub fn status_code(&self) -> StatusCode {
        match self {
            SignVerifyError::MissingImages
            | SignVerifyError::NoSelectedFile
            | SignVerifyError::Multipart(_)
            | SignVerifyError::InvalidCaseStudyName(_) => StatusCode::BAD_REQUEST,
            SignVerifyError::UnsupportedFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            SignVerifyError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            SignVerifyError::ImageDecode { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SignVerifyError::CaseStudyNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, SignVerifyError>;
