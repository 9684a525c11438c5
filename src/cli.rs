use crate::constants::API_KEY_ENV;
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "img-tinify",
    about = "Optimize images through the TinyPNG compression API",
    long_about = "img-tinify uploads PNG, JPEG and WebP images to the TinyPNG API, tracks each \
                  image's upload and download progress, and either replaces the originals in place \
                  (with a rollback-safe backup) or writes the results into an output directory.",
    version = "0.1.0",
    after_help = "EXAMPLES:\n  \
    img-tinify config set --api-key YOUR_KEY\n  \
    img-tinify optimize photo.png banner.jpg\n  \
    img-tinify optimize ./images -r -o ./optimized\n  \
    img-tinify optimize \"./shots/*.png\" --override\n  \
    img-tinify quota"
)]
pub struct Args {
    #[arg(
        long,
        global = true,
        help = "Settings file path",
        long_help = "Settings file to read and update. \
                     Defaults to <config dir>/img-tinify/settings.json"
    )]
    pub config: Option<PathBuf>,

    #[arg(short = 'q', long, global = true, help = "Only print errors")]
    pub quiet: bool,

    #[arg(short = 'v', long, global = true, help = "Print diagnostic details")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(
        about = "Optimize images through the API",
        long_about = "Upload every matching image in parallel, download the optimized result and \
                      place it according to the configured policy."
    )]
    Optimize {
        #[arg(
            required = true,
            help = "Image files, directories or glob patterns",
            long_help = "Inputs can be image files, directories or glob expressions. \
                         Examples: 'photo.png', './images', './shots/*.{png,jpg}'"
        )]
        inputs: Vec<String>,

        #[arg(
            short = 'k',
            long,
            env = API_KEY_ENV,
            hide_env_values = true,
            help = "TinyPNG API key (overrides the stored key)"
        )]
        api_key: Option<String>,

        #[arg(
            long = "override",
            conflicts_with = "output",
            help = "Replace the original files",
            long_help = "Replace each original in place. The original is kept as <name>.bak \
                         until the optimized file has been moved over it."
        )]
        override_original: bool,

        #[arg(
            short = 'o',
            long,
            help = "Write optimized images into this directory",
            long_help = "Write optimized images into this directory, created if missing. \
                         Existing names get a ' (n)' suffix."
        )]
        output: Option<PathBuf>,

        #[arg(
            short = 'r',
            long,
            help = "Process subdirectories recursively",
            long_help = "Recursively process all subdirectories when an input is a directory."
        )]
        recursive: bool,
    },

    #[command(about = "Show or change stored settings")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    #[command(about = "Show the compression count reported by the API")]
    Quota,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    #[command(about = "Print the stored settings")]
    Show,

    #[command(about = "Update stored settings")]
    Set(ConfigSetArgs),
}

#[derive(ClapArgs)]
pub struct ConfigSetArgs {
    #[arg(short = 'k', long, help = "TinyPNG API key")]
    pub api_key: Option<String>,

    #[arg(
        long,
        action = ArgAction::Set,
        value_name = "BOOL",
        help = "Replace originals (true) or write into the output directory (false)"
    )]
    pub override_original: Option<bool>,

    #[arg(short = 'o', long, help = "Output directory used when not overriding")]
    pub output: Option<PathBuf>,

    #[arg(
        long,
        action = ArgAction::Set,
        value_name = "BOOL",
        help = "Start optimizing as soon as images are added"
    )]
    pub auto_processing: Option<bool>,
}

impl ConfigSetArgs {
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none()
            && self.override_original.is_none()
            && self.output.is_none()
            && self.auto_processing.is_none()
    }
}
