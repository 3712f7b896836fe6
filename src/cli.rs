use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sign-verify")]
#[command(about = "署名画像照合サーバ・CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// HTTPサーバを起動
    Serve {
        /// 待ち受けアドレス（例: 0.0.0.0:5000）
        #[arg(short, long)]
        bind: Option<String>,

        /// アップロード一時保存先
        #[arg(long)]
        upload_dir: Option<PathBuf>,

        /// ケースフォルダの保存先
        #[arg(long)]
        case_dir: Option<PathBuf>,

        /// マッチ図(matches.png)も保存
        #[arg(long)]
        save_diagram: bool,
    },

    /// 2枚の署名画像をローカルで照合
    Compare {
        /// 1枚目の画像
        #[arg(required = true)]
        image1: PathBuf,

        /// 2枚目の画像
        #[arg(required = true)]
        image2: PathBuf,

        /// ケースフォルダの保存先
        #[arg(long)]
        case_dir: Option<PathBuf>,

        /// マッチ図(matches.png)も保存
        #[arg(long)]
        save_diagram: bool,

        /// 比率テストの閾値
        #[arg(long)]
        ratio: Option<f32>,

        /// 一致と判定する類似度の閾値
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// 古いケースフォルダを削除
    Cleanup {
        /// ケースフォルダの保存先
        #[arg(long)]
        case_dir: Option<PathBuf>,

        /// 保存日数
        #[arg(long)]
        max_age_days: Option<u64>,

        /// 保持するフォルダ数
        #[arg(long)]
        max_folders: Option<usize>,

        /// 削除対象を表示するだけ
        #[arg(long)]
        dry_run: bool,
    },

    /// 設定管理
    Config {
        /// 現在の設定を表示
        #[arg(long)]
        show: bool,

        /// 現在の設定を設定ファイルに書き出す
        #[arg(long)]
        init: bool,
    },
}
