use std::{env, path::PathBuf, sync::Arc};

use fazt_server::Builder;
use fazt_store_sqlite::StoreSqlite;
use fazt_types::worker::WorkerPool;

fn env_or(key: &str, default: &str) -> String {
	env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() {
	let data_dir = PathBuf::from(env_or("FAZT_DATA_DIR", "./data"));
	if let Err(err) = std::fs::create_dir_all(&data_dir) {
		eprintln!("FATAL: cannot create data dir {}: {}", data_dir.display(), err);
		std::process::exit(1);
	}

	let worker = Arc::new(WorkerPool::new(1, 3));
	let store = match StoreSqlite::new(worker.clone(), &data_dir).await {
		Ok(store) => Arc::new(store),
		Err(err) => {
			eprintln!("FATAL: cannot open data.db: {}", err);
			std::process::exit(1);
		}
	};

	let mut builder = Builder::new();
	builder
		.listen(env_or("FAZT_LISTEN", "0.0.0.0:8080"))
		.apex(env_or("FAZT_APEX", "localhost.localdomain"))
		.data_dir(data_dir)
		.worker(worker)
		.auth_adapter(store.clone())
		.meta_adapter(store);

	if let Ok(listen_https) = env::var("FAZT_LISTEN_HTTPS") {
		builder.listen_https(listen_https);
	}
	if let Ok(acme_email) = env::var("FAZT_ACME_EMAIL") {
		builder.acme_email(acme_email);
	}
	if let (Ok(email), Ok(password)) =
		(env::var("FAZT_OWNER_EMAIL"), env::var("FAZT_OWNER_PASSWORD"))
	{
		builder.owner(email, password);
	}
	if let Ok(proxies) = env::var("FAZT_TRUSTED_PROXIES") {
		let parsed: Vec<std::net::IpAddr> =
			proxies.split(',').filter_map(|ip| ip.trim().parse().ok()).collect();
		builder.trusted_proxies(parsed);
	}

	if let Err(err) = builder.run().await {
		eprintln!("FATAL: {}", err);
		std::process::exit(1);
	}
}

// vim: ts=4
