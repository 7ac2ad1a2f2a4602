use std::path::PathBuf;
use std::sync::Arc;

use almacen_session::transport::Method;
use almacen_session::{
    AlmacenApi, ApiRequest, FileStore, LocationNavigator, SessionClient, SessionConfig, SessionError, SessionPhase,
};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("not logged in; run `almacen login`")]
    NotLoggedIn,
}

#[derive(Parser, Debug)]
#[command(name = "almacen", about = "Almacén warehouse API client")]
struct Cli {
    /// API root; overrides the configured default.
    #[arg(long, env = "ALMACEN_API_URL")]
    base_url: Option<String>,

    /// Where the access and refresh tokens are kept between runs.
    #[arg(long, env = "ALMACEN_TOKEN_FILE", default_value = ".almacen-session.json")]
    token_file: PathBuf,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Ping,
    Login {
        #[arg(long, env = "ALMACEN_USERNAME")]
        username: String,
        #[arg(long, env = "ALMACEN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    /// Restore the stored session and print the current user.
    Whoami,
    /// Print the locally known session state without contacting the API.
    Status,
    Productos(ProductosCommand),
    Categorias(CategoriasCommand),
    /// Register a stock-out for a product.
    Salida {
        #[arg(long)]
        producto: i64,
        #[arg(long)]
        cantidad: i64,
        #[arg(long)]
        entregado_a: String,
        #[arg(long, default_value = "")]
        motivo: String,
    },
    /// Register a stock entry for a product.
    Ingreso {
        #[arg(long)]
        producto: i64,
        #[arg(long)]
        cantidad: i64,
        /// `YYYY-MM-DD HH:MM:SS`; the server time is used when omitted.
        #[arg(long)]
        fecha: Option<String>,
    },
    /// Stock entries for one day (`YYYY-MM-DD`, today by default).
    Ingresos {
        #[arg(long)]
        fecha: Option<String>,
    },
    /// Movement history, for one product or all of them.
    Historial {
        #[arg(long)]
        producto: Option<i64>,
    },
    /// List personnel, or search by name or DNI.
    Personal {
        #[arg(long)]
        buscar: Option<String>,
    },
    Tareos,
    Noticias,
    Dashboard,
    /// Raw authenticated request against any API path.
    Api(RawCommand),
}

#[derive(Args, Debug)]
struct ProductosCommand {
    #[command(subcommand)]
    command: ProductosSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProductosSubcommand {
    List,
    Get { id: i64 },
}

#[derive(Args, Debug)]
struct CategoriasCommand {
    #[command(subcommand)]
    command: CategoriasSubcommand,
}

#[derive(Subcommand, Debug)]
enum CategoriasSubcommand {
    List,
    Create {
        #[arg(long)]
        nombre: String,
    },
}

#[derive(Args, Debug)]
struct RawCommand {
    #[command(subcommand)]
    command: RawSubcommand,
}

#[derive(Subcommand, Debug)]
enum RawSubcommand {
    Get {
        path: String,
    },
    Post {
        path: String,
        #[arg(long)]
        data: String,
    },
    Delete {
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut config = SessionConfig::from_env()?;
    if let Some(base_url) = &cli.base_url {
        config.base_url = SessionConfig::new(base_url).base_url;
    }

    let store = Arc::new(FileStore::new(&cli.token_file));
    let navigator = Arc::new(LocationNavigator::new());
    let client = SessionClient::from_config(config, store, navigator.clone())?;

    let result = run(&client, cli.command).await;
    if let Some(location) = navigator.location() {
        eprintln!("session expired (redirect to {location}); run `almacen login` again");
    }
    result
}

async fn run(client: &SessionClient, command: Command) -> Result<(), CliError> {
    let api = AlmacenApi::new(client);
    match command {
        Command::Ping => print_json(&api.health().await?),
        Command::Login { username, password } => {
            let user = client.login(&username, &password).await?;
            println!("logged in as {} ({})", user.username, user.role());
            Ok(())
        }
        Command::Logout => {
            client.logout()?;
            println!("logged out");
            Ok(())
        }
        Command::Whoami => {
            let state = client.restore().await?;
            let user = state.user.ok_or(CliError::NotLoggedIn)?;
            print_json(&serde_json::to_value(&user)?)
        }
        Command::Status => {
            let state = client.state();
            let phase = match state.phase {
                SessionPhase::Authenticated => "authenticated",
                SessionPhase::Refreshing => "refreshing",
                SessionPhase::LoggedOut => "logged out",
            };
            println!("{phase} ({})", client.config().base_url);
            Ok(())
        }
        Command::Productos(productos) => match productos.command {
            ProductosSubcommand::List => print_json(&serde_json::to_value(api.list_productos().await?)?),
            ProductosSubcommand::Get { id } => print_json(&serde_json::to_value(api.get_producto(id).await?)?),
        },
        Command::Categorias(categorias) => match categorias.command {
            CategoriasSubcommand::List => print_json(&serde_json::to_value(api.list_categorias().await?)?),
            CategoriasSubcommand::Create { nombre } => {
                print_json(&serde_json::to_value(api.create_categoria(&nombre).await?)?)
            }
        },
        Command::Salida { producto, cantidad, entregado_a, motivo } => {
            let salida = api.registrar_salida(producto, cantidad, &entregado_a, &motivo).await?;
            println!(
                "registered stock-out: producto={} cantidad={} entregado_a={}",
                salida.producto, salida.cantidad, salida.entregado_a
            );
            Ok(())
        }
        Command::Ingreso { producto, cantidad, fecha } => {
            let ingreso = api.registrar_ingreso(producto, cantidad, fecha.as_deref()).await?;
            println!("registered stock entry #{}: producto={} cantidad={}", ingreso.id, ingreso.producto, ingreso.cantidad);
            Ok(())
        }
        Command::Ingresos { fecha } => print_json(&serde_json::to_value(api.ingresos_del_dia(fecha.as_deref()).await?)?),
        Command::Historial { producto } => print_json(&serde_json::to_value(api.historial_producto(producto).await?)?),
        Command::Personal { buscar } => {
            let personal = match buscar {
                Some(texto) => api.buscar_personal(&texto).await?,
                None => api.list_personal().await?,
            };
            print_json(&serde_json::to_value(personal)?)
        }
        Command::Tareos => print_json(&Value::Array(api.list_tareos().await?)),
        Command::Noticias => print_json(&serde_json::to_value(api.list_noticias().await?)?),
        Command::Dashboard => print_json(&api.dashboard_data().await?),
        Command::Api(raw) => run_raw(client, raw).await,
    }
}

async fn run_raw(client: &SessionClient, raw: RawCommand) -> Result<(), CliError> {
    let request = match raw.command {
        RawSubcommand::Get { path } => ApiRequest::get(path),
        RawSubcommand::Post { path, data } => ApiRequest::post(path, serde_json::from_str::<Value>(&data)?),
        RawSubcommand::Delete { path } => ApiRequest::new(Method::DELETE, path),
    };

    let response = client.send(request).await?;
    if !response.is_success() {
        return Err(SessionError::Status { status: response.status.as_u16(), body: response.text() }.into());
    }
    if response.body.is_empty() {
        return Ok(());
    }
    match response.json::<Value>() {
        Ok(value) => print_json(&value),
        Err(_) => {
            println!("{}", response.text());
            Ok(())
        }
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
