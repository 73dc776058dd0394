use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use graph_drive_uploader::{
    config::AppConfig, logging, DirectoryUploadOrchestrator, DriveClient, ReqwestTransport,
    StaticTokenProvider,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Graph 网盘批量上传工具", long_about = None)]
struct Cli {
    /// 访问令牌
    #[arg(long, env = "GRAPH_ACCESS_TOKEN", hide_env_values = true)]
    token: String,

    /// 配置文件路径
    #[arg(long, default_value = "config/app.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 上传本地目录树，本地根目录的内容直接放到远程目录下
    UploadTree { local: PathBuf, remote: String },
    /// 上传本地文件夹到 <remote-parent>/<文件夹名>
    UploadFolder { local: PathBuf, remote_parent: String },
    /// 上传单个文件
    UploadFile { local: PathBuf, remote_folder: String },
    /// 获取或创建条目的分享链接
    Share {
        item_id: String,
        #[arg(long = "type", default_value = "view")]
        link_type: String,
        #[arg(long, default_value = "organization")]
        scope: String,
    },
}

#[derive(Serialize)]
struct ShareOutput {
    item_id: String,
    web_url: Option<String>,
    created: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_or_default(&cli.config).await;
    let _log_guard = logging::init_logging(&config.log);

    info!("Graph Drive Uploader v{}", env!("CARGO_PKG_VERSION"));

    let options = config
        .upload
        .to_options()
        .context("上传配置无效")?;
    let transport = Arc::new(ReqwestTransport::new().context("创建 HTTP 客户端失败")?);
    let tokens = Arc::new(StaticTokenProvider::new(cli.token.clone()));
    let client = DriveClient::new(&config.graph, transport, tokens);
    let orchestrator = DirectoryUploadOrchestrator::new(client.clone(), options);

    // Ctrl+C 取消正在进行的上传
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("收到中断信号，正在取消上传...");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Command::UploadTree { local, remote } => {
            let summary = orchestrator
                .upload_tree_with_cancel(&local, &remote, &cancel)
                .await?;
            print_json(&summary)?;
        }
        Command::UploadFolder {
            local,
            remote_parent,
        } => {
            let summary = orchestrator
                .upload_folder_with_cancel(&local, &remote_parent, &cancel)
                .await?;
            print_json(&summary)?;
        }
        Command::UploadFile {
            local,
            remote_folder,
        } => {
            let item = orchestrator
                .upload_file_with_cancel(&local, &remote_folder, &cancel)
                .await?;
            print_json(&item)?;
        }
        Command::Share {
            item_id,
            link_type,
            scope,
        } => {
            let output = match client.find_share_link(&item_id).await? {
                Some(web_url) => ShareOutput {
                    item_id,
                    web_url: Some(web_url),
                    created: false,
                },
                None => {
                    let link = client
                        .create_share_link(&item_id, &link_type, &scope)
                        .await?;
                    ShareOutput {
                        item_id,
                        web_url: link.web_url,
                        created: true,
                    }
                }
            };
            print_json(&output)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("序列化输出失败")?;
    println!("{}", text);
    Ok(())
}
