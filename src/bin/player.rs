use std::path::PathBuf;

use clap::Parser;
use framelink::{
    AnyResult, Config, LoadBalancer, PlaybackSession, StreamConnection,
    client::{Frame, PlaybackEnd, probe_from_config, probe_tier},
    common::{
        banner::{BannerInfo, print_banner},
        logger,
    },
    transport::ClientTls,
};
use tracing::{debug, info, warn};

/// Streams a title from a framelink server pool.
#[derive(Parser, Debug)]
#[command(name = "framelink-player", version)]
struct Args {
    /// Title to play, as listed in the server catalog.
    title: String,

    /// Address of the server pool.
    ip: String,

    /// Initial server port.
    port: u16,

    /// Configuration file. Defaults to config.toml, then config.default.toml.
    #[arg(short, long, env = "FRAMELINK_CONFIG")]
    config: Option<PathBuf>,

    /// Write received frames to this directory as `<index>_<tier>.jpg`.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

async fn render(frames: flume::Receiver<Frame>, output: Option<PathBuf>) -> u64 {
    let mut rendered = 0;
    while let Ok(frame) = frames.recv_async().await {
        if let Some(dir) = &output {
            let path = dir.join(format!("{:06}_{}.jpg", frame.index, frame.tier));
            if let Err(e) = tokio::fs::write(&path, &frame.data).await {
                warn!("failed to write {}: {}", path.display(), e);
                continue;
            }
        }
        debug!(
            "frame {} at {} ({} bytes)",
            frame.index,
            frame.tier,
            frame.data.len()
        );
        rendered += 1;
    }
    rendered
}

/// Reads control lines on a plain thread so a pending stdin read never holds up exit.
fn spawn_controls() -> flume::Receiver<String> {
    let (tx, rx) = flume::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line.trim().to_ascii_lowercase()).is_err() {
                break;
            }
        }
    });
    rx
}

/// The next control line. Pends forever once stdin is closed.
async fn next_control(controls: Option<&flume::Receiver<String>>) -> Option<String> {
    match controls {
        Some(controls) => controls.recv_async().await.ok(),
        None => std::future::pending().await,
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    logger::init(&config.logging);
    print_banner("player", &BannerInfo::default());

    if let Some(dir) = &args.output {
        tokio::fs::create_dir_all(dir).await?;
    }

    let tls = ClientTls::from_config(&config.tls)?;
    let probe = probe_from_config(&config.latency);
    let tier = probe_tier(probe.as_ref()).await;
    info!("initial tier {}", tier);

    let connection = StreamConnection::connect(
        &tls,
        &args.ip,
        args.port,
        config.player.max_frame_bytes,
    )
    .await?;
    let (session, frames) = PlaybackSession::new(
        args.title.clone(),
        connection,
        tier,
        probe,
        config.player.clone(),
    );

    if config.balancer.enabled {
        let mut balancer_config = config.balancer.clone();
        balancer_config.host = args.ip.clone();
        LoadBalancer::new(tls.clone(), balancer_config, config.player.max_frame_bytes)
            .spawn(session.connection(), session.stop_token());
    }

    let renderer = tokio::spawn(render(frames, args.output.clone()));
    session.play()?;
    info!("controls: play | pause | stop");

    let mut controls = Some(spawn_controls());
    let end = loop {
        tokio::select! {
            end = session.wait() => break end,
            _ = tokio::signal::ctrl_c() => {
                session.stop().await;
                break PlaybackEnd::Stopped;
            }
            line = next_control(controls.as_ref()) => {
                let Some(command) = line else {
                    debug!("stdin closed, controls disabled");
                    controls = None;
                    continue;
                };
                let result = match command.as_str() {
                    "play" => session.play(),
                    "pause" => session.pause(),
                    "stop" | "quit" => {
                        session.stop().await;
                        break PlaybackEnd::Stopped;
                    }
                    "" => Ok(()),
                    other => {
                        warn!("unknown control {:?}", other);
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    warn!("{}: {}", command, e);
                }
            }
        }
    };

    drop(session);
    let rendered = renderer.await.unwrap_or_default();
    match end {
        PlaybackEnd::EndOfStream { index } => {
            info!("finished {} at frame {}, rendered {}", args.title, index, rendered)
        }
        PlaybackEnd::Stopped => info!("stopped {}, rendered {}", args.title, rendered),
        PlaybackEnd::ConnectionLost(reason) => {
            warn!("lost connection: {}, rendered {}", reason, rendered);
            return Err(reason.into());
        }
    }
    Ok(())
}
