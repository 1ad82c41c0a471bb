use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    executor::{ServerState, Session},
    resp::RespValue,
    store::PartitionState,
};

#[derive(Debug, PartialEq)]
enum InfoSection {
    All,
    Replication,
    Persistence,
    Keyspace,
}

pub struct InfoArguments {
    section: InfoSection,
}

impl InfoArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let section = match arguments.as_slice() {
            [] => InfoSection::All,
            [section] => match section.to_lowercase().as_str() {
                "all" | "default" | "everything" => InfoSection::All,
                "replication" => InfoSection::Replication,
                "persistence" => InfoSection::Persistence,
                "keyspace" => InfoSection::Keyspace,
                _ => return Err(CommandError::SyntaxError),
            },
            _ => return Err(CommandError::SyntaxError),
        };

        Ok(InfoArguments { section })
    }
}

/// Handles INFO [section]. Replies with a bulk string of `field:value` lines.
pub fn info(
    server: &mut ServerState,
    _session: &mut Session,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let info_arguments = InfoArguments::parse(arguments)?;

    let sections = match info_arguments.section {
        InfoSection::All => vec![
            replication_section(server),
            persistence_section(server),
            keyspace_section(server),
        ],
        InfoSection::Replication => vec![replication_section(server)],
        InfoSection::Persistence => vec![persistence_section(server)],
        InfoSection::Keyspace => vec![keyspace_section(server)],
    };

    let mut text = sections.join("\r\n");
    text.push_str("\r\n");

    Ok(CommandResult::Response(RespValue::BulkString(text).encode()))
}

fn replication_section(server: &ServerState) -> String {
    let mut lines = vec!["# Replication".to_string()];

    match server.slave.master() {
        Some((host, port)) => {
            let slave_state = server.slave.state();
            let link_status = if server.slave.is_connected() {
                "up"
            } else {
                "down"
            };

            lines.push("role:slave".to_string());
            lines.push(format!("master_host:{}", host));
            lines.push(format!("master_port:{}", port));
            lines.push(format!("master_link_status:{}", link_status));
            lines.push(format!("slave_state:{}", slave_state.as_str()));
            lines.push(format!(
                "master_last_io_seconds_ago:{}",
                server.slave.last_io().elapsed().as_secs()
            ));
        }
        None => lines.push("role:master".to_string()),
    }

    lines.push(format!(
        "connected_slaves:{}",
        server.master.replica_count()
    ));

    for (index, (id, replica)) in server.master.replicas().enumerate() {
        let ip = server
            .clients
            .get(*id)
            .map(|client| client.ip().to_string())
            .unwrap_or_default();

        lines.push(format!(
            "slave{}:ip={},port={},state={},offset={}",
            index,
            ip,
            replica.listening_port.unwrap_or(0),
            replica.state.as_str(),
            replica.ack_offset
        ));
    }

    let identity = server.master.identity();
    lines.push(format!("master_replid:{}", identity.replid));
    lines.push(format!("master_replid2:{}", identity.replid2));
    lines.push(format!("master_repl_offset:{}", server.master.offset()));
    lines.push(format!("second_repl_offset:{}", identity.second_offset));

    match server.master.backlog() {
        Some(backlog) => {
            lines.push(format!(
                "repl_backlog_active:{}",
                u8::from(backlog.is_active())
            ));
            lines.push(format!("repl_backlog_size:{}", backlog.capacity()));
            lines.push(format!(
                "repl_backlog_first_byte_offset:{}",
                backlog.first_offset()
            ));
            lines.push(format!("repl_backlog_histlen:{}", backlog.valid_len()));
        }
        None => {
            lines.push("repl_backlog_active:0".to_string());
            lines.push(format!("repl_backlog_size:{}", server.config.repl_backlog_size));
            lines.push("repl_backlog_first_byte_offset:0".to_string());
            lines.push("repl_backlog_histlen:0".to_string());
        }
    }

    lines.join("\r\n")
}

fn persistence_section(server: &ServerState) -> String {
    let status = server.partitions.status();
    let in_progress = matches!(status, PartitionState::Frozen | PartitionState::Stopped);

    [
        "# Persistence".to_string(),
        format!("rdb_bgsave_in_progress:{}", u8::from(in_progress)),
        format!("rdb_last_save_time:{}", server.last_save),
        format!(
            "rdb_last_bgsave_status:{}",
            if server.last_bgsave_ok { "ok" } else { "err" }
        ),
        format!("db_status:{}", status.as_str()),
    ]
    .join("\r\n")
}

fn keyspace_section(server: &ServerState) -> String {
    let mut lines = vec!["# Keyspace".to_string()];

    for (index, partition) in server.partitions.iter().enumerate() {
        if partition.is_empty() {
            continue;
        }

        lines.push(format!(
            "db{}:keys={},expires={}",
            index,
            partition.len(),
            partition.primary().ttl_count()
        ));
    }

    lines.join("\r\n")
}
