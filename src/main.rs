mod ai;
mod commands;
mod config;
mod naming;
mod poller;
mod reference;
mod session;
mod studio;
#[cfg(test)]
mod testing;
mod video;

use clap::{Parser, Subcommand};

use crate::commands::character_pack::{character_pack, CharacterPackArgs};
use crate::commands::imagen::{imagen, ImagenCommand};
use crate::commands::matrix::{matrix, MatrixArgs};
use crate::commands::ref_images::{ref_images, RefImagesArgs};
use crate::commands::rewrite::{rewrite, RewriteArgs};
use crate::commands::shot_chain::{shot_chain, ShotChainArgs};
use crate::commands::simple::{simple, SimpleArgs};
use crate::commands::storyboard::{storyboard, StoryboardArgs};
use crate::config::Settings;

#[derive(Parser)]
#[command(name = "genlab")]
#[command(about = "Generate images and videos with Imagen and Veo", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Image generation lab
    #[command(subcommand)]
    Imagen(ImagenCommand),
    /// Video generation lab
    #[command(subcommand)]
    Veo(VeoCommand),
}

#[derive(Subcommand)]
enum VeoCommand {
    /// Generate a single clip
    Simple(SimpleArgs),
    /// Chain clips through their last frames
    ShotChain(ShotChainArgs),
    /// Render a JSON storyboard
    Storyboard(StoryboardArgs),
    /// One clip per reference image
    RefImages(RefImagesArgs),
    /// Sweep a prompt template over a parameter matrix
    Matrix(MatrixArgs),
    /// One scene against a pack of character references
    CharacterPack(CharacterPackArgs),
    /// Ask a text model for prompt variants
    Rewrite(RewriteArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    match cli.command {
        Command::Imagen(command) => imagen(command, &settings).await,
        Command::Veo(command) => match command {
            VeoCommand::Simple(args) => simple(args, &settings).await,
            VeoCommand::ShotChain(args) => shot_chain(args, &settings).await,
            VeoCommand::Storyboard(args) => storyboard(args, &settings).await,
            VeoCommand::RefImages(args) => ref_images(args, &settings).await,
            VeoCommand::Matrix(args) => matrix(args, &settings).await,
            VeoCommand::CharacterPack(args) => character_pack(args, &settings).await,
            VeoCommand::Rewrite(args) => rewrite(args, &settings).await,
        },
    }
}
