use clap::Parser;
use sign_verify::{case_study, cli, config, server, verifier};
use cli::{Cli, Commands};
use config::Config;
use std::time::SystemTime;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let mut config = Config::load()?;

    match cli.command {
        Commands::Serve { bind, upload_dir, case_dir, save_diagram } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(dir) = upload_dir {
                config.upload_dir = dir;
            }
            if let Some(dir) = case_dir {
                config.case_dir = dir;
            }
            config.save_match_diagram |= save_diagram;
            config.validate()?;

            println!("🖊  sign-verify - 照合サーバ\n");
            println!("  待ち受け: http://{}", config.bind_addr);
            println!("  ケースフォルダ: {}\n", config.case_dir.display());

            server::serve(config).await?;
        }

        Commands::Compare { image1, image2, case_dir, save_diagram, ratio, threshold } => {
            if let Some(dir) = case_dir {
                config.case_dir = dir;
            }
            if let Some(ratio) = ratio {
                config.ratio_threshold = ratio;
            }
            if let Some(threshold) = threshold {
                config.match_threshold = threshold;
            }
            config.save_match_diagram |= save_diagram;
            config.validate()?;

            println!("🖊  sign-verify - 署名照合\n");
            println!("[1/2] 特徴点を照合中...");
            let options = verifier::VerifyOptions::from(&config);
            let result = tokio::task::spawn_blocking(move || {
                verifier::verify_signatures(&image1, &image2, &options)
            })
            .await??;
            println!(
                "✔ 類似度: {:.4} ({})\n",
                result.similarity_score,
                sign_verify_common::format_percentage(result.similarity_score)
            );

            println!("[2/2] 結果を保存...");
            println!("✔ {}", result.data_folder());

            let mark = if result.verdict.is_match() { "✅" } else { "❌" };
            println!("\n{} {}", mark, result.verdict);
        }

        Commands::Cleanup { case_dir, max_age_days, max_folders, dry_run } => {
            let case_dir = case_dir.unwrap_or_else(|| config.case_dir.clone());
            let mut policy = config.retention.clone();
            if max_age_days.is_some() {
                policy.max_age_days = max_age_days;
            }
            if max_folders.is_some() {
                policy.max_folders = max_folders;
            }

            if !policy.is_enabled() {
                println!("保持ポリシーが未設定です（--max-age-days / --max-folders）");
                return Ok(());
            }

            if dry_run {
                let targets = case_study::plan_prune(&case_dir, &policy, SystemTime::now());
                println!("削除対象: {}件", targets.len());
                for path in targets {
                    println!("  {}", path.display());
                }
            } else {
                let removed = case_study::prune_case_studies(&case_dir, &policy, SystemTime::now(), None)?;
                println!("✔ {}件のケースフォルダを削除", removed.len());
            }
        }

        Commands::Config { show, init } => {
            if init {
                config.save()?;
                println!("✔ 設定ファイルを書き出しました: {}", Config::config_path()?.display());
            }

            if show || !init {
                println!("設定:");
                println!("  待ち受け: {}", config.bind_addr);
                println!("  アップロード先: {}", config.upload_dir.display());
                println!("  ケースフォルダ: {}", config.case_dir.display());
                println!("  比率テスト閾値: {}", config.ratio_threshold);
                println!("  一致判定閾値: {}", config.match_threshold);
                println!("  マッチ図保存: {}", if config.save_match_diagram { "有効" } else { "無効" });
                println!("  最大アップロード: {} bytes", config.max_upload_bytes);
                println!("  最大画像サイズ: {}px", config.max_image_dimension);
                match config.max_keypoints {
                    Some(n) => println!("  最大特徴点数: {}", n),
                    None => println!("  最大特徴点数: 無制限"),
                }
                match config.retention.max_age_days {
                    Some(days) => println!("  保存日数: {}日", days),
                    None => println!("  保存日数: 無期限"),
                }
                match config.retention.max_folders {
                    Some(n) => println!("  保持件数: {}", n),
                    None => println!("  保持件数: 無制限"),
                }
            }
        }
    }

    Ok(())
}
