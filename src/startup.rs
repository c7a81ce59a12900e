use crate::cache::RedisCache;
use crate::config::Config;
use crate::gateway::HttpGateway;
use anyhow::{Context, Result};

pub struct ValidationReport {
    pub environment: bool,
    pub gateway: bool,
    /// `None` when no cache is configured.
    pub redis: Option<bool>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.gateway && self.redis.unwrap_or(true)
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Storefront API:        {}", status(self.gateway));
        match self.redis {
            Some(ok) => println!("Redis Connectivity:    {}", status(ok)),
            None => println!("Redis Connectivity:    - (cache disabled)"),
        }

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config) -> ValidationReport {
    let mut report = ValidationReport {
        environment: true,
        gateway: true,
        redis: None,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {:#}", e));
    }

    if let Err(e) = validate_gateway(config).await {
        report.gateway = false;
        report.errors.push(format!("Storefront API: {:#}", e));
    }

    if let Some(redis_url) = &config.redis_url {
        let ok = match validate_redis(redis_url).await {
            Ok(()) => true,
            Err(e) => {
                report.errors.push(format!("Redis: {:#}", e));
                false
            }
        };
        report.redis = Some(ok);
    }

    report
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.gateway_timeout_secs == 0 {
        anyhow::bail!("GATEWAY_TIMEOUT_SECS must be greater than 0");
    }
    if config.circuit_breaker_threshold == 0 {
        anyhow::bail!("CIRCUIT_BREAKER_THRESHOLD must be greater than 0");
    }

    let url = url::Url::parse(&config.gateway_base_url)
        .context("GATEWAY_BASE_URL is not a valid URL")?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("GATEWAY_BASE_URL must use http or https, got '{}'", url.scheme());
    }
    if let Some(redis_url) = &config.redis_url {
        url::Url::parse(redis_url).context("REDIS_URL is not a valid URL")?;
    }

    Ok(())
}

async fn validate_gateway(config: &Config) -> Result<()> {
    let gateway = HttpGateway::new(
        &config.gateway_base_url,
        config.gateway_token.clone(),
        config.gateway_timeout(),
    )?;
    gateway
        .ping()
        .await
        .context("Failed to reach the storefront API")?;
    Ok(())
}

async fn validate_redis(redis_url: &str) -> Result<()> {
    let cache = RedisCache::new(redis_url).context("Invalid Redis URL")?;
    cache.ping().await.context("Redis PING failed")?;
    Ok(())
}
