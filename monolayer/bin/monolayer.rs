use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use monolayer::{
    cli::{AnsiStyles, MonolayerArgs, MonolayerSubcommand},
    config::{BaseLayerStrategy, ChainConfig},
    image::{ImageUnpacker, LayerChain, PlatformFilter},
    layer::{DiffApplier, DiffGenerator},
    utils, MonolayerResult,
};
use tracing_subscriber::{fmt, EnvFilter};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let args = MonolayerArgs::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };

    fmt()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            for failure in e.failures() {
                eprintln!("{} {}", "error:".error(), failure);
            }
            ExitCode::FAILURE
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: *
//--------------------------------------------------------------------------------------------------

async fn run(args: MonolayerArgs) -> MonolayerResult<()> {
    match args.subcommand {
        Some(MonolayerSubcommand::Unpack {
            image_dir,
            output,
            os,
            arch,
            clone_base,
        }) => {
            tracing::trace!("unpacking image: image_dir={image_dir:?}, output={output:?}");
            let config = chain_config(output, clone_base);
            let root = config.get_root().clone();

            let unpacker = match os.zip(arch) {
                Some((os, arch)) => ImageUnpacker::builder()
                    .image_dir(image_dir)
                    .config(config)
                    .platform(PlatformFilter::new(os, arch))
                    .build(),
                None => ImageUnpacker::builder()
                    .image_dir(image_dir)
                    .config(config)
                    .build(),
            };

            let manifest = unpacker.unpack().await?;
            println!(
                "unpacked {} layers into {}",
                manifest.layers().len(),
                root.display().to_string().literal()
            );
        }
        Some(MonolayerSubcommand::Apply { base, diff, merged }) => {
            tracing::trace!("applying diff: base={base:?}, diff={diff:?}, merged={merged:?}");
            DiffApplier::new(base, diff, merged).apply().await?;
        }
        Some(MonolayerSubcommand::Diff {
            base,
            modified,
            output,
        }) => {
            tracing::trace!("generating diff: base={base:?}, modified={modified:?}, output={output:?}");
            DiffGenerator::new(base, modified, output).generate().await?;
        }
        Some(MonolayerSubcommand::Chain {
            root,
            clone_base,
            layers,
        }) => {
            tracing::trace!("materializing chain: root={root:?}, layers={layers:?}");
            let rootfs = LayerChain::new(chain_config(root, clone_base), layers)
                .materialize()
                .await?;
            println!("{}", rootfs.display());
        }
        None => {
            MonolayerArgs::command().print_help()?;
        }
    }

    Ok(())
}

fn chain_config(root: Option<std::path::PathBuf>, clone_base: bool) -> ChainConfig {
    let base_strategy = if clone_base {
        BaseLayerStrategy::Clone
    } else {
        BaseLayerStrategy::Symlink
    };

    ChainConfig::builder()
        .root(root.unwrap_or_else(utils::default_layers_path))
        .base_strategy(base_strategy)
        .build()
}
