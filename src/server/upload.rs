//! マルチパートアップロードの検証と一時保存

use crate::error::{Result, SignVerifyError};
use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::StatusCode;
use regex::Regex;
use std::path::{Path, PathBuf};

/// 受け付ける拡張子（小文字）
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub const FIELD_IMAGE1: &str = "image1";
pub const FIELD_IMAGE2: &str = "image2";

/// アップロードされた画像
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// クライアントが送ったファイル名
    pub file_name: String,
    pub data: Bytes,
}

/// `image1` / `image2` を読み取り、欠落 → 空ファイル名 → 拡張子 の順で検証
pub async fn read_image_pair(mut multipart: Multipart) -> Result<(UploadedImage, UploadedImage)> {
    let mut image1 = None;
    let mut image2 = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let slot = match field.name() {
            Some(FIELD_IMAGE1) => &mut image1,
            Some(FIELD_IMAGE2) => &mut image2,
            _ => continue,
        };
        // ファイル名のない部分はファイルとして扱わない
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field.bytes().await.map_err(multipart_error)?;
        *slot = Some(UploadedImage { file_name, data });
    }

    let (Some(image1), Some(image2)) = (image1, image2) else {
        return Err(SignVerifyError::MissingImages);
    };
    if image1.file_name.is_empty() || image2.file_name.is_empty() {
        return Err(SignVerifyError::NoSelectedFile);
    }
    for image in [&image1, &image2] {
        if !allowed_file(&image.file_name) {
            return Err(SignVerifyError::UnsupportedFileType(image.file_name.clone()));
        }
    }

    Ok((image1, image2))
}

/// 本文サイズ超過は413、それ以外は400
fn multipart_error(e: MultipartError) -> SignVerifyError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        SignVerifyError::PayloadTooLarge
    } else {
        SignVerifyError::Multipart(e.body_text())
    }
}

/// 拡張子が png/jpg/jpeg か（大文字小文字を区別しない）
pub fn allowed_file(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// 保存用の安全なファイル名に変換
///
/// パス区切りと空白は `_` に、英数字・`_`・`.`・`-` 以外は除去し、
/// 先頭末尾の `.` と `_` を落とす。何も残らなければ `image`。
pub fn secure_filename(file_name: &str) -> String {
    lazy_static::lazy_static! {
        static ref UNSAFE_RE: Regex = Regex::new(r"[^A-Za-z0-9_.-]").unwrap();
    }

    let joined = file_name
        .replace(['/', '\\'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    let cleaned = UNSAFE_RE.replace_all(&joined, "");
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed.to_string()
    }
}

/// 同名衝突時に `<stem>_2.<ext>` へ
fn dedupe_name(name: &str, taken: &str) -> String {
    if name != taken {
        return name.to_string();
    }
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{}_2.{}", stem, ext.to_string_lossy()),
        None => format!("{}_2", stem),
    }
}

/// 2枚をリクエスト用ディレクトリに保存し、保存先パスを返す
pub async fn store_pair(dir: &Path, image1: UploadedImage, image2: UploadedImage) -> Result<(PathBuf, PathBuf)> {
    tokio::fs::create_dir_all(dir).await?;

    let name1 = secure_filename(&image1.file_name);
    let name2 = dedupe_name(&secure_filename(&image2.file_name), &name1);

    let path1 = dir.join(name1);
    let path2 = dir.join(name2);
    tokio::fs::write(&path1, &image1.data).await?;
    tokio::fs::write(&path2, &image2.data).await?;

    Ok((path1, path2))
}
