//! Interface de linha de comando do lintas baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (migrate, register,
//! transition, status, history, stages, resync) e flags globais
//! (--config, --wait-secs, --verbose).

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

use lintas::state_machine::EntityKind;

/// lintas: rastreamento de entregas com espelho em tempo real.
#[derive(Debug, Parser)]
#[command(name = "lintas", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração.
    #[arg(long, global = true, default_value = "lintas.toml")]
    pub config: PathBuf,

    /// Segundos de espera pela replicação no espelho antes de sair.
    #[arg(long, global = true, default_value_t = 15)]
    pub wait_secs: u64,

    /// Ativa logs de depuração.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Tipo de entidade aceito na linha de comando.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    /// Entregas de refeições às escolas.
    Delivery,
    /// Lavagem de ompreng (marmitas).
    Cleaning,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Delivery => EntityKind::Delivery,
            KindArg::Cleaning => EntityKind::Cleaning,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Cria ou atualiza o schema do banco.
    Migrate,

    /// Registra um novo registro no primeiro estágio.
    Register {
        kind: KindArg,

        /// Dia de serviço do registro (YYYY-MM-DD).
        #[arg(long)]
        date: NaiveDate,

        /// Payload específico do tipo, em JSON.
        #[arg(long)]
        payload: String,
    },

    /// Move um registro para o próximo estágio.
    Transition {
        kind: KindArg,
        id: i64,
        status: String,

        /// Quem realizou a mudança.
        #[arg(long)]
        actor: String,

        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Mostra o estado atual de um registro.
    Status { kind: KindArg, id: i64 },

    /// Mostra o histórico de transições de um registro.
    History { kind: KindArg, id: i64 },

    /// Lista os estágios configurados de um tipo.
    Stages { kind: KindArg },

    /// Replica novamente todos os registros de um tipo no espelho.
    Resync {
        kind: KindArg,

        /// Apenas registros deste dia de serviço (YYYY-MM-DD).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

impl Command {
    pub fn kind(&self) -> Option<EntityKind> {
        match self {
            Command::Migrate => None,
            Command::Register { kind, .. }
            | Command::Transition { kind, .. }
            | Command::Status { kind, .. }
            | Command::History { kind, .. }
            | Command::Stages { kind }
            | Command::Resync { kind, .. } => Some((*kind).into()),
        }
    }
}
