//! Configuração do lintas carregada a partir de `lintas.toml`.
//!
//! A struct [`LintasConfig`] contém todos os parâmetros configuráveis.
//! Valores ausentes no arquivo usam defaults; `LINTAS_DATABASE_URL` e
//! `LINTAS_MIRROR_TOKEN` têm precedência sobre o arquivo.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::replication::{BackoffPolicy, MAX_ATTEMPTS};
use crate::state_machine::{EntityKind, StageGraph, default_stages};

/// Configuração de nível superior.
#[derive(Debug, Clone, Deserialize)]
pub struct LintasConfig {
    /// URL SQLite do armazenamento autoritativo.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default)]
    pub mirror: MirrorConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "default_delivery_table")]
    pub delivery: StageTableConfig,

    #[serde(default = "default_cleaning_table")]
    pub cleaning: StageTableConfig,
}

/// Conexão com o espelho em tempo real. `base_url` vazio mantém o espelho em memória.
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub auth_token: String,

    /// Limite de tempo para uma única escrita no espelho.
    #[serde(default = "default_push_timeout_ms")]
    pub push_timeout_ms: u64,
}

/// Política de retentativas da replicação.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Retentativas após a tentativa inicial.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Atraso base em milissegundos; a retentativa `n` espera `base * 2^n`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Capacidade da fila de retentativas de cada tipo.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Tabela de estágios de um tipo de entidade.
#[derive(Debug, Clone, Deserialize)]
pub struct StageTableConfig {
    /// Domínio no espelho, primeiro segmento de todo caminho.
    pub domain: String,

    /// Níveis ordenados; um nível com vários estágios contém alternativas.
    pub levels: Vec<Vec<String>>,

    /// Pares `[from, to]` permitidos. Se omitido, todo estágio liga a todos
    /// os estágios do nível seguinte.
    #[serde(default)]
    pub edges: Option<Vec<[String; 2]>>,
}

// Valor padrão do banco: `lintas.db` no diretório atual.
fn default_database_url() -> String {
    "sqlite://lintas.db".to_string()
}

// Valor padrão para o timeout de escrita: 10s.
fn default_push_timeout_ms() -> u64 {
    10_000
}

// Valor padrão para retentativas máximas: 5.
fn default_max_attempts() -> u32 {
    MAX_ATTEMPTS
}

// Valor padrão para o atraso base: 1000ms.
fn default_base_delay_ms() -> u64 {
    1000
}

// Valor padrão para a capacidade da fila: 256 itens.
fn default_queue_capacity() -> usize {
    256
}

fn default_table(kind: EntityKind, domain: &str) -> StageTableConfig {
    StageTableConfig {
        domain: domain.to_string(),
        levels: default_stages(kind)
            .into_iter()
            .map(|s| vec![s.to_string()])
            .collect(),
        edges: None,
    }
}

fn default_delivery_table() -> StageTableConfig {
    default_table(EntityKind::Delivery, "delivery_monitoring")
}

fn default_cleaning_table() -> StageTableConfig {
    default_table(EntityKind::Cleaning, "ompreng_cleaning")
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth_token: String::new(),
            push_timeout_ms: default_push_timeout_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for LintasConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            mirror: MirrorConfig::default(),
            retry: RetryConfig::default(),
            delivery: default_delivery_table(),
            cleaning: default_cleaning_table(),
        }
    }
}

impl MirrorConfig {
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(self.base_delay_ms), self.max_attempts)
    }
}

impl StageTableConfig {
    /// Constrói e valida o grafo de estágios descrito por esta tabela.
    pub fn graph(&self) -> crate::error::Result<StageGraph> {
        let edges = self
            .edges
            .as_ref()
            .map(|edges| edges.iter().map(|[f, t]| (f.clone(), t.clone())).collect());
        StageGraph::new(self.levels.clone(), edges)
    }
}

impl LintasConfig {
    /// Carrega de `path`, usando os defaults quando o arquivo não existe.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<LintasConfig>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var("LINTAS_DATABASE_URL")
            && !url.is_empty()
        {
            config.database_url = url;
        }
        if let Ok(token) = std::env::var("LINTAS_MIRROR_TOKEN")
            && !token.is_empty()
        {
            config.mirror.auth_token = token;
        }

        config.delivery.graph().context("invalid [delivery] stage table")?;
        config.cleaning.graph().context("invalid [cleaning] stage table")?;

        Ok(config)
    }

    pub fn table(&self, kind: EntityKind) -> &StageTableConfig {
        match kind {
            EntityKind::Delivery => &self.delivery,
            EntityKind::Cleaning => &self.cleaning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = LintasConfig::default();
        assert_eq!(config.database_url, "sqlite://lintas.db");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.mirror.push_timeout(), Duration::from_secs(10));
        assert!(config.mirror.base_url.is_empty());
        assert_eq!(config.delivery.domain, "delivery_monitoring");
        assert_eq!(config.cleaning.levels.len(), 3);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            [mirror]
            base_url = "https://kitchen.example.firebaseio.com"

            [retry]
            max_attempts = 3
        "#;
        let config: LintasConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.mirror.base_url, "https://kitchen.example.firebaseio.com");
        assert_eq!(config.mirror.push_timeout_ms, 10_000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.delivery.domain, "delivery_monitoring");
    }

    #[test]
    fn custom_stage_table_with_edges() {
        let toml_str = r#"
            [cleaning]
            domain = "wash"
            levels = [["returned"], ["soaking", "rinsing"], ["dry"]]
            edges = [["returned", "soaking"], ["soaking", "dry"]]
        "#;
        let config: LintasConfig = toml::from_str(toml_str).unwrap();
        let graph = config.table(EntityKind::Cleaning).graph().unwrap();
        assert!(graph.validate("returned", "soaking").is_ok());
        assert!(graph.validate("returned", "rinsing").is_err());
        assert_eq!(graph.initial(), "returned");
    }

    #[test]
    fn load_reads_file_and_rejects_bad_tables() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            database_url = "sqlite://kitchen.db"
            [retry]
            base_delay_ms = 250
            "#
        )
        .unwrap();
        let config = LintasConfig::load(file.path()).unwrap();
        assert_eq!(config.retry.backoff().delay_for(1), Duration::from_millis(500));

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            bad,
            r#"
            [delivery]
            domain = "d"
            levels = [["a"], ["b"]]
            edges = [["a", "z"]]
            "#
        )
        .unwrap();
        assert!(LintasConfig::load(bad.path()).is_err());
    }

    #[test]
    fn mirror_token_from_env_wins_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [mirror]
            auth_token = "from-file"
            "#
        )
        .unwrap();

        // No other test reads auth_token after load.
        unsafe { std::env::set_var("LINTAS_MIRROR_TOKEN", "from-env") };
        let config = LintasConfig::load(file.path()).unwrap();
        unsafe { std::env::remove_var("LINTAS_MIRROR_TOKEN") };

        assert_eq!(config.mirror.auth_token, "from-env");
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LintasConfig::load(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
    }
}
