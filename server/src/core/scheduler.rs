//! Periodic maintenance tasks on cron schedules.

use chrono::Utc;
use croner::Cron;
use std::str::FromStr;
use std::time::Duration;

use crate::prelude::*;

/// Cron schedule wrapper using the croner crate
#[derive(Debug, Clone)]
pub struct CronSchedule {
	expr: Box<str>,
	cron: Cron,
}

impl CronSchedule {
	/// Parse a cron expression (5 fields: minute hour day month weekday)
	pub fn parse(expr: &str) -> FzResult<Self> {
		let cron = Cron::from_str(expr)
			.map_err(|e| Error::ValidationError(format!("invalid cron expression: {}", e)))?;
		Ok(Self { expr: expr.into(), cron })
	}

	/// Seconds until the next execution after `now`
	fn next_delay(&self) -> FzResult<Duration> {
		let now = Utc::now();
		let next = self.cron.find_next_occurrence(&now, false).map_err(|e| {
			Error::ValidationError(format!("cron next occurrence failed for '{}': {}", self.expr, e))
		})?;
		let delta = next.signed_duration_since(now);
		Ok(delta.to_std().unwrap_or(Duration::from_secs(60)))
	}
}

type TaskFn = Box<dyn Fn(App) -> futures::future::BoxFuture<'static, ()> + Send + Sync>;

struct ScheduledTask {
	name: &'static str,
	schedule: CronSchedule,
	run: TaskFn,
}

#[derive(Default)]
pub struct Scheduler {
	tasks: Vec<ScheduledTask>,
}

impl Scheduler {
	pub fn new() -> Self {
		Scheduler { tasks: Vec::new() }
	}

	pub fn register<F, Fut>(&mut self, name: &'static str, expr: &str, task: F) -> FzResult<()>
	where
		F: Fn(App) -> Fut + Send + Sync + 'static,
		Fut: std::future::Future<Output = ()> + Send + 'static,
	{
		let schedule = CronSchedule::parse(expr)?;
		self.tasks.push(ScheduledTask {
			name,
			schedule,
			run: Box::new(move |app| Box::pin(task(app))),
		});
		Ok(())
	}

	/// Spawn one loop per task; loops live for the process lifetime
	pub fn start(self, app: App) {
		for task in self.tasks {
			let app = app.clone();
			tokio::spawn(async move {
				loop {
					let delay = match task.schedule.next_delay() {
						Ok(delay) => delay,
						Err(err) => {
							error!("scheduler task '{}' stopped: {}", task.name, err);
							return;
						}
					};
					tokio::time::sleep(delay).await;
					debug!("running scheduled task '{}'", task.name);
					(task.run)(app.clone()).await;
				}
			});
		}
	}
}

/// The standard maintenance schedule: credential purge, throttle pruning,
/// analytics flushing and certificate renewal.
pub fn standard_tasks(scheduler: &mut Scheduler) -> FzResult<()> {
	scheduler.register("purge-credentials", "23 * * * *", |app| async move {
		match app.auth_adapter.purge_expired_sessions().await {
			Ok(purged) if purged > 0 => info!("purged {} expired credentials", purged),
			Ok(_) => {}
			Err(err) => warn!("credential purge failed: {}", err),
		}
		app.login_throttle.prune();
	})?;

	scheduler.register("flush-analytics", "* * * * *", |app| async move {
		app.analytics.flush(&app).await;
	})?;

	scheduler.register("renew-certs", "41 3 * * *", |app| async move {
		if let Err(err) = crate::core::acme::renew_expiring_certs(&app).await {
			warn!("certificate renewal sweep failed: {}", err);
		}
	})?;

	Ok(())
}


// vim: ts=4
