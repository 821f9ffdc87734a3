//! Escada administrative CLI.
//!
//! Exit codes: 0 OK, 1 usage error, 2 operational failure, 3 precondition
//! not met (eg/ no venue credentials configured).

use clap::{Parser, Subcommand};
use escada_core::{
    config::EngineConfig,
    domain::{account::Account, AccountId, PositionId},
    engine::Engine,
    logging::init_logging,
    notify::TracingNotifier,
    scheduler::Scheduler,
    shutdown::Shutdown,
};
use escada_exchange::{
    binance::BinanceFutures, bitget::Bitget, bybit::Bybit, kraken::Kraken, kucoin::Kucoin,
    ExchangeAdapter,
};
use escada_integration::AccountRateLimiter;
use escada_markets::{ExchangeId, MarginMode};
use smol_str::SmolStr;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

const EXIT_OK: u8 = 0;
const EXIT_USAGE: u8 = 1;
const EXIT_OPERATIONAL: u8 = 2;
const EXIT_PRECONDITION: u8 = 3;

#[derive(Debug, Parser)]
#[command(name = "escada", about = "Escada perpetual-futures ladder engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scheduler control.
    Scheduler {
        #[command(subcommand)]
        action: SchedulerAction,
    },
    /// Position management.
    Position {
        #[command(subcommand)]
        action: PositionAction,
    },
    /// Global kill-switch for opening new positions.
    KillSwitch {
        #[command(subcommand)]
        action: KillSwitchAction,
    },
}

#[derive(Debug, Subcommand)]
enum SchedulerAction {
    /// Run the scheduler in the foreground until interrupted.
    Start,
    /// Stop a running foreground scheduler (reads the pidfile).
    Stop,
}

#[derive(Debug, Subcommand)]
enum PositionAction {
    /// List known positions.
    List,
    /// Cancel a position: cancel its orders and settle it cancelled.
    Cancel { id: u64 },
    /// Close a position at market.
    Close { id: u64 },
}

#[derive(Debug, Subcommand)]
enum KillSwitchAction {
    /// Disallow opening new positions.
    On,
    /// Allow opening new positions.
    Off,
}

fn pidfile() -> String {
    std::env::var("ESCADA_PIDFILE").unwrap_or_else(|_| "/tmp/escada-scheduler.pid".to_string())
}

/// Build adapters for every venue with credentials in the environment.
fn build_engine() -> Result<Arc<Engine>, u8> {
    let config = EngineConfig::from_env();
    let engine = Arc::new(Engine::new(config.clone(), Arc::new(TracingNotifier)));

    let mut next_account = 1u64;
    for exchange in [
        ExchangeId::BinanceFutures,
        ExchangeId::Bybit,
        ExchangeId::Bitget,
        ExchangeId::Kucoin,
        ExchangeId::Kraken,
    ] {
        let Some(credentials) = EngineConfig::credentials_from_env(exchange) else {
            continue;
        };
        let base_url = EngineConfig::base_url_from_env(exchange);
        let limiter = Arc::new(AccountRateLimiter::new(config.account_weight_per_minute));
        let quote = SmolStr::new("USDT");

        let adapter: Arc<dyn ExchangeAdapter> = match exchange {
            ExchangeId::BinanceFutures => match BinanceFutures::new(
                credentials.clone(),
                base_url,
                limiter,
                quote.clone(),
            ) {
                Ok(adapter) => Arc::new(adapter),
                Err(error) => {
                    error!(%exchange, %error, "adapter construction failed");
                    return Err(EXIT_OPERATIONAL);
                }
            },
            ExchangeId::Bybit => {
                match Bybit::new(credentials.clone(), base_url, limiter, quote.clone()) {
                    Ok(adapter) => Arc::new(adapter),
                    Err(error) => {
                        error!(%exchange, %error, "adapter construction failed");
                        return Err(EXIT_OPERATIONAL);
                    }
                }
            }
            ExchangeId::Bitget => {
                match Bitget::new(credentials.clone(), base_url, limiter, quote.clone()) {
                    Ok(adapter) => Arc::new(adapter),
                    Err(error) => {
                        error!(%exchange, %error, "adapter construction failed");
                        return Err(EXIT_OPERATIONAL);
                    }
                }
            }
            ExchangeId::Kucoin => {
                match Kucoin::new(credentials.clone(), base_url, limiter, quote.clone()) {
                    Ok(adapter) => Arc::new(adapter),
                    Err(error) => {
                        error!(%exchange, %error, "adapter construction failed");
                        return Err(EXIT_OPERATIONAL);
                    }
                }
            }
            ExchangeId::Kraken => match Kraken::new(credentials.clone(), base_url, limiter) {
                Ok(adapter) => Arc::new(adapter),
                Err(error) => {
                    error!(%exchange, %error, "adapter construction failed");
                    return Err(EXIT_OPERATIONAL);
                }
            },
        };

        let account = Account {
            id: AccountId(next_account),
            exchange,
            credentials,
            trading_quote: quote,
            max_position_percentage: rust_decimal_from_env("ESCADA_MAX_POSITION_PERCENTAGE", 5),
            position_leverage_long: 10,
            position_leverage_short: 10,
            margin_mode: MarginMode::Isolated,
            stop_market_initial_percentage: rust_decimal_from_env(
                "ESCADA_STOP_MARKET_PERCENTAGE",
                8,
            ),
            profit_percentage: rust_decimal_from_env("ESCADA_PROFIT_PERCENTAGE", 1),
            total_limit_orders_filled_to_notify: 3,
            can_trade: true,
        };
        engine.register_account(account, adapter);
        next_account += 1;
    }

    if next_account == 1 {
        error!("no venue credentials configured (ESCADA_<EXCHANGE>_API_KEY / _API_SECRET)");
        return Err(EXIT_PRECONDITION);
    }
    Ok(engine)
}

fn rust_decimal_from_env(name: &str, default: i64) -> rust_decimal::Decimal {
    std::env::var(name)
        .ok()
        .and_then(|value| escada_markets::parse_decimal(&value).ok())
        .unwrap_or_else(|| rust_decimal::Decimal::from(default))
}

async fn scheduler_start() -> u8 {
    let engine = match build_engine() {
        Ok(engine) => engine,
        Err(code) => return code,
    };

    if let Err(error) = std::fs::write(pidfile(), std::process::id().to_string()) {
        error!(%error, "could not write pidfile");
        return EXIT_OPERATIONAL;
    }

    let (shutdown, listener) = Shutdown::new();
    let scheduler = Scheduler::new(engine);
    let runner = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run(listener).await }
    });

    if tokio::signal::ctrl_c().await.is_err() {
        error!("signal handler unavailable");
        return EXIT_OPERATIONAL;
    }
    info!("interrupt received, stopping scheduler");
    shutdown.shutdown();
    let _ = runner.await;
    let _ = std::fs::remove_file(pidfile());
    EXIT_OK
}

fn scheduler_stop() -> u8 {
    let path = pidfile();
    let pid = match std::fs::read_to_string(&path) {
        Ok(contents) => contents.trim().to_string(),
        Err(_) => {
            eprintln!("no scheduler pidfile at {path}; is it running?");
            return EXIT_PRECONDITION;
        }
    };
    match std::process::Command::new("kill").arg(&pid).status() {
        Ok(status) if status.success() => {
            println!("scheduler (pid {pid}) signalled");
            EXIT_OK
        }
        _ => {
            eprintln!("could not signal scheduler pid {pid}");
            EXIT_OPERATIONAL
        }
    }
}

fn position_list(engine: &Engine) -> u8 {
    let mut positions = engine.store.positions();
    positions.sort_by_key(|position| position.id.0);
    if positions.is_empty() {
        println!("no positions");
        return EXIT_OK;
    }
    println!(
        "{:<6} {:<10} {:<20} {:<6} {:<10} {:<10} {:<12}",
        "id", "account", "symbol", "dir", "status", "leverage", "quantity"
    );
    for position in positions {
        println!(
            "{:<6} {:<10} {:<20} {:<6} {:<10} {:<10} {:<12}",
            position.id,
            position.account_id,
            position.symbol.to_string(),
            position.direction,
            position.status,
            position.leverage,
            position.quantity,
        );
    }
    EXIT_OK
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            // help/version requests are not usage errors
            if error.use_stderr() {
                let _ = error.print();
                return ExitCode::from(EXIT_USAGE);
            }
            let _ = error.print();
            return ExitCode::from(EXIT_OK);
        }
    };

    let code = match cli.command {
        Command::Scheduler { action } => match action {
            SchedulerAction::Start => scheduler_start().await,
            SchedulerAction::Stop => scheduler_stop(),
        },
        Command::Position { action } => {
            let engine = match build_engine() {
                Ok(engine) => engine,
                Err(code) => return ExitCode::from(code),
            };
            match action {
                PositionAction::List => position_list(&engine),
                PositionAction::Cancel { id } => match engine.request_cancel(PositionId(id)) {
                    Ok(()) => {
                        engine.drain().await;
                        println!("position {id} cancelled");
                        EXIT_OK
                    }
                    Err(error) => {
                        eprintln!("cancel failed: {error}");
                        EXIT_OPERATIONAL
                    }
                },
                PositionAction::Close { id } => match engine.request_close(PositionId(id)) {
                    Ok(()) => {
                        engine.drain().await;
                        println!("position {id} closed");
                        EXIT_OK
                    }
                    Err(error) => {
                        eprintln!("close failed: {error}");
                        EXIT_OPERATIONAL
                    }
                },
            }
        }
        Command::KillSwitch { action } => {
            let engine = match build_engine() {
                Ok(engine) => engine,
                Err(code) => return ExitCode::from(code),
            };
            match action {
                KillSwitchAction::On => {
                    engine.store.set_allow_opening_positions(false);
                    println!("kill-switch on: new positions disabled");
                    EXIT_OK
                }
                KillSwitchAction::Off => {
                    engine.store.set_allow_opening_positions(true);
                    println!("kill-switch off: new positions enabled");
                    EXIT_OK
                }
            }
        }
    };
    ExitCode::from(code)
}
