//! toolchat - Entry Point
//!
//! Interactive REPL host around the agent. The agent itself is owned
//! here explicitly; the REPL is just one possible host.

use tokio::io::{AsyncBufReadExt, BufReader};
use toolchat::{Agent, LogFormat};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("toolchat v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: toolchat [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --json-logs        Log as JSON to stderr");
        println!("  --help, -h         Show this help");
        println!();
        println!("Environment variables:");
        println!("  SMITHERY_API_KEY     Smithery API key (remote tools)");
        println!("  SMITHERY_PROFILE     Smithery profile identifier");
        println!("  TOOLCHAT_MCP_URL     MCP server base URL");
        println!("  RUST_LOG             Log level (trace|debug|info|warn|error)");
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    if args.iter().any(|a| a == "--json-logs") {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("toolchat v{}", env!("CARGO_PKG_VERSION"));

    let agent = Agent::from_env()?;
    agent.initialize().await;

    println!("toolchat 준비 완료. /help 로 명령어를 확인하세요.");

    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            info!("stdin closed, shutting down");
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = input.strip_prefix('/') {
            if !run_command(&agent, command).await {
                break;
            }
            continue;
        }

        let reply = agent.handle_message(input).await;
        println!("{reply}");
    }

    Ok(())
}

/// Handle one slash command; returns false to quit
async fn run_command(agent: &Agent, command: &str) -> bool {
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();

    match name {
        "quit" | "exit" => return false,
        "help" => {
            println!("/status     연결 상태");
            println!("/tools      사용 가능한 툴 목록");
            println!("/stats      사용 통계");
            println!("/recent     최근 실행 내역");
            println!("/log <fmt>  로그 내보내기 (json|csv|text)");
            println!("/reconnect  MCP 서버 재연결");
            println!("/clear      실행 로그 초기화");
            println!("/quit       종료");
        }
        "status" => {
            let status = agent.connection_status().await;
            match serde_json::to_string_pretty(&status) {
                Ok(s) => println!("{s}"),
                Err(e) => println!("상태 조회 실패: {e}"),
            }
        }
        "tools" => {
            let inventory = agent.available_tools().await;
            println!("로컬 툴:");
            for tool in &inventory.local {
                println!("  {} - {}", tool.name, tool.description);
            }
            if inventory.remote_connected {
                println!("원격 툴:");
                for tool in &inventory.remote {
                    println!("  {} - {}", tool.name, tool.description);
                }
            } else {
                println!("원격 툴: (연결되지 않음)");
            }
        }
        "stats" => {
            let stats = agent.usage_statistics();
            match serde_json::to_string_pretty(&stats) {
                Ok(s) => println!("{s}"),
                Err(e) => println!("통계 조회 실패: {e}"),
            }
        }
        "recent" => {
            let entries = agent.recent_activity(10);
            if entries.is_empty() {
                println!("실행 로그가 없습니다.");
            }
            for entry in entries {
                println!(
                    "[{}] {} ({}) {}ms -> {}",
                    entry.timestamp.format("%H:%M:%S"),
                    entry.tool_name,
                    entry.kind.as_str(),
                    entry.elapsed_ms,
                    entry.result,
                );
            }
        }
        "log" => match arg.unwrap_or("text").parse::<LogFormat>() {
            Ok(format) => println!("{}", agent.export_log(format)),
            Err(e) => println!("{e}"),
        },
        "reconnect" => {
            let connected = agent.reconnect().await;
            if connected {
                println!("MCP 서버 재연결 성공");
            } else {
                println!("MCP 서버 재연결 실패 - 로컬 툴만 사용 가능합니다");
            }
        }
        "clear" => {
            agent.clear_log();
            println!("실행 로그를 초기화했습니다.");
        }
        other => println!("알 수 없는 명령어: /{other} (/help 참고)"),
    }

    true
}
