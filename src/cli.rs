use clap::{ArgAction, Parser, Subcommand};

const DEFAULT_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data");

#[derive(Parser, Debug)]
#[command(name = "kompas-backend")]
#[command(about = "Care facility directory backend (DuckDB + axum)", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the facility CSV and the locality gazetteer into DuckDB.
    Import(ImportArgs),
    /// Serve the public and admin HTTP API.
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ImportArgs {
    /// Backend data directory (downloads and the DuckDB database).
    #[arg(long, env = "DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    /// Facility CSV in the admin export layout (`id,nazwa,typ_placowki,...`).
    #[arg(long)]
    pub facilities_csv: Option<String>,

    /// Gazetteer file: `nazwa;rodzaj;gmina;powiat;wojewodztwo` CSV, or a ZIP holding one.
    #[arg(long)]
    pub gazetteer_file: Option<String>,

    /// Where to fetch the gazetteer archive when no local file is given.
    #[arg(long, env = "GAZETTEER_URL")]
    pub gazetteer_url: Option<String>,

    /// MOPS contact CSV (`miasto,nazwa,telefon,email,adres,www,wojewodztwo,...`).
    #[arg(long)]
    pub mops_csv: Option<String>,

    /// Do not download missing inputs; error instead.
    #[arg(long)]
    pub offline: bool,

    /// Re-download the gazetteer even if it already exists.
    #[arg(long)]
    pub force_download: bool,

    /// Replace existing facilities instead of refusing to import over them.
    #[arg(long)]
    pub replace: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Backend data directory (DuckDB database).
    #[arg(long, env = "DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8787)]
    pub port: u16,

    /// Admin panel password. Login fails with a configuration error when unset.
    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// When false every `/api/admin` route answers 404.
    #[arg(long, env = "ADMIN_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub admin_enabled: bool,

    /// Base URL used to build share links (`<base>/s/<token>`).
    #[arg(long, env = "PUBLIC_BASE_URL", default_value = "http://localhost:3000")]
    pub public_base_url: String,

    #[arg(long, env = "NOMINATIM_URL", default_value = crate::geocode::DEFAULT_NOMINATIM_URL)]
    pub nominatim_url: String,

    /// Mark the admin session cookie `Secure` (serve behind HTTPS).
    #[arg(long, env = "SECURE_COOKIES")]
    pub secure_cookies: bool,
}
