use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)] // requires `derive` feature
#[command(name = "leveleater")]
#[command(bin_name = "leveleater")]
pub struct LeveleaterCli {
    /// decomp checkout holding `levels/` (or `howtomake/levels/`)
    #[arg(long, short = 'r', default_value = ".")]
    pub project_root: PathBuf,

    /// short name of the level, every level is listed when left out
    #[arg(long, short = 'l')]
    pub level: Option<String>,

    /// area number, all areas otherwise
    #[arg(long, short = 'a')]
    pub area: Option<String>,

    #[arg(long, short = 'o', default_value = "output")]
    pub output: PathBuf,

    #[arg(long, default_value_t = false, action = clap::ArgAction::SetTrue)]
    pub obj: bool,

    #[arg(long, default_value_t = false, action = clap::ArgAction::SetTrue)]
    pub save: bool,
}
