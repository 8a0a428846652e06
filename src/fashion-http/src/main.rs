use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use std::convert::Infallible;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use structopt::StructOpt;

use fashion_serve::{DebugSnapshots, FashionClassifier};
use log::{error, info};

mod service;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "fashion-http",
    about = "HTTP service classifying garment images with a Fashion-MNIST model"
)]
struct CmdArgs {
    /// Export directory of the TensorFlow SavedModel
    #[structopt(long, default_value = "models/fashion_mnist_model", parse(from_os_str))]
    model_dir: PathBuf,

    /// Address to listen on
    #[structopt(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on
    #[structopt(long, default_value = "5000")]
    port: u16,

    /// Save the resized grayscale input of every request in this directory
    #[structopt(long, parse(from_os_str))]
    debug_snapshot_dir: Option<PathBuf>,
}

/// Why the service could not start.
#[derive(Debug)]
enum StartupError {
    Model(PathBuf, fashion_serve::Error),
    Snapshots(PathBuf, fashion_serve::Error),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Model(dir, e) => {
                write!(f, "Could not load model from {}: {}", dir.display(), e)
            }
            StartupError::Snapshots(dir, e) => write!(
                f,
                "Could not create debug snapshot directory {}: {}",
                dir.display(),
                e
            ),
        }
    }
}

fn with_snapshots(
    classifier: FashionClassifier,
    dir: Option<&Path>,
) -> Result<FashionClassifier, StartupError> {
    let dir = match dir {
        None => return Ok(classifier),
        Some(dir) => dir,
    };

    let snapshots =
        DebugSnapshots::new(dir).map_err(|e| StartupError::Snapshots(dir.to_path_buf(), e))?;
    info!("Saving pre-processed images to {}", snapshots.dir().display());

    Ok(classifier.with_debug_snapshots(snapshots))
}

fn load_classifier(args: &CmdArgs) -> Result<FashionClassifier, StartupError> {
    let classifier = FashionClassifier::load(&args.model_dir)
        .map_err(|e| StartupError::Model(args.model_dir.clone(), e))?;

    info!("Model '{}' loaded", args.model_dir.display());

    with_snapshots(classifier, args.debug_snapshot_dir.as_deref())
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = CmdArgs::from_args();

    let classifier = match load_classifier(&args) {
        Ok(classifier) => Arc::new(classifier),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let make_service = make_service_fn(move |_conn: &AddrStream| {
        let class = Arc::clone(&classifier);

        let service = service_fn(move |req| service::handle(req, class.clone()));

        async move { Ok::<_, Infallible>(service) }
    });

    let addr = SocketAddr::new(args.host, args.port);

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_service),
        Err(e) => {
            error!("Could not bind {}: {}", addr, e);
            process::exit(1);
        }
    };

    info!("Listening on http://{}", addr);

    if let Err(e) = server.await {
        error!("server error: {}", e);
        process::exit(1);
    }
}
