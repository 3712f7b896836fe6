//! レポートファイルの読み書きエラー

use std::path::{Path, PathBuf};
use thiserror::Error;

/// どのファイルで失敗したかを保持する
#[derive(Error, Debug)]
pub enum Error {
    #[error("レポートを開けません: {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("レポートを書き込めません: {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("レポートの形式が不正: {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn read(path: &Path, source: std::io::Error) -> Self {
        Error::Read { path: path.to_path_buf(), source }
    }

    pub(crate) fn write(path: &Path, source: std::io::Error) -> Self {
        Error::Write { path: path.to_path_buf(), source }
    }

    pub(crate) fn format(path: &Path, source: serde_json::Error) -> Self {
        Error::Format { path: path.to_path_buf(), source }
    }

    pub fn path(&self) -> &Path {
        match self {
            Error::Read { path, .. } | Error::Write { path, .. } | Error::Format { path, .. } => path,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
