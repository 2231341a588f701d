use std::io::Cursor;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, info};
use tracing_subscriber::FmtSubscriber;

use ldapwire::config::CliArgs;
use ldapwire::{decode, encode, Config, LdapCodec, LdapGrammar};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = CliArgs::parse();
    let config = Config::from_cli_args(args)?;

    FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_writer(std::io::stderr)
        .init();

    let grammar = LdapGrammar::build(&config.codec)?;
    info!(
        input = %config.input.display(),
        patterns = grammar.pattern_count(),
        "Decoding capture"
    );

    let count = if config.hex {
        let text = tokio::fs::read_to_string(&config.input)
            .await
            .with_context(|| format!("Failed to read {}", config.input.display()))?;
        let digits: String = text.split_whitespace().collect();
        let bytes = hex::decode(digits).context("Input is not valid hex")?;
        dump(Cursor::new(bytes), &grammar, config.verify).await?
    } else {
        let file = tokio::fs::File::open(&config.input)
            .await
            .with_context(|| format!("Failed to open {}", config.input.display()))?;
        dump(file, &grammar, config.verify).await?
    };

    info!("Decoded {} message(s)", count);
    Ok(())
}

async fn dump<R>(reader: R, grammar: &Arc<LdapGrammar>, verify: bool) -> anyhow::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, LdapCodec::new(grammar.clone()));
    let mut count = 0;

    while let Some(message) = frames.next().await {
        let message = message.with_context(|| format!("Failed to decode message #{}", count + 1))?;
        count += 1;
        println!("{:#?}", message);

        if verify {
            let bytes = encode(&message)?;
            let decoded = decode(grammar, &bytes)?;
            if decoded != message {
                bail!(
                    "Message {} did not survive re-encoding: {:?} != {:?}",
                    message.message_id,
                    decoded,
                    message
                );
            }
            debug!(message_id = message.message_id, "Re-encoding verified");
        }
    }

    Ok(count)
}
