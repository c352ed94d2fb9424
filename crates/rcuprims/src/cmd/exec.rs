use std::fs;
use std::sync::Arc;

use serde::Serialize;

use rcuprims_router::{share, Reply, Router, RouterConfig};
use tracing::warn;

use crate::cmd::ExecArgs;
use crate::device::{close_channel, open_channel};
use crate::exit::{io_error, router_code, router_error, CliError, CliResult, SUCCESS};
use crate::output::{hex, new_table, print_json, print_raw, OutputFormat};

#[derive(Serialize)]
struct ReplyOutput {
    group: String,
    id: u8,
    ok: bool,
    error: Option<String>,
    words: Vec<u32>,
}

impl From<&Reply> for ReplyOutput {
    fn from(reply: &Reply) -> Self {
        Self {
            group: reply.header.group.to_string(),
            id: reply.header.id,
            ok: reply.is_ok(),
            error: reply.result.as_ref().err().map(ToString::to_string),
            words: reply.words().to_vec(),
        }
    }
}

#[derive(Serialize)]
struct ExecOutput {
    schema_id: &'static str,
    commands: usize,
    failed: usize,
    replies: Vec<ReplyOutput>,
}

pub fn run(args: ExecArgs, format: OutputFormat) -> CliResult<i32> {
    let stream = load_stream(&args)?;
    let channel = open_channel(&args.device)?;

    let shared = share(channel);
    let config = RouterConfig {
        relaxed: args.relaxed,
    };
    let routed = Router::for_channel(Arc::clone(&shared), config).process(&stream);
    if let Ok(mutex) = Arc::try_unwrap(shared) {
        close_channel(mutex.into_inner().unwrap_or_else(|e| e.into_inner()))?;
    }
    let replies = routed.map_err(|err| router_error("stream rejected", err))?;

    let code = exit_code(&replies);
    print_replies(&replies, format);
    Ok(code)
}

fn load_stream(args: &ExecArgs) -> CliResult<Vec<u8>> {
    if let Some(words) = &args.words {
        return Ok(le_bytes(words));
    }
    let path = args
        .file
        .as_ref()
        .ok_or_else(|| CliError::usage("--file or --words is required"))?;
    fs::read(path).map_err(|err| io_error(&format!("failed reading {}", path.display()), err))
}

/// The code of the first failed command, success when all succeeded.
fn exit_code(replies: &[Reply]) -> i32 {
    replies
        .iter()
        .find_map(|reply| reply.result.as_ref().err())
        .map(|err| {
            warn!(error = %err, "command in stream failed");
            router_code(err)
        })
        .unwrap_or(SUCCESS)
}

fn print_replies(replies: &[Reply], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ExecOutput {
            schema_id: "rcuprims.cli.v1.exec-result",
            commands: replies.len(),
            failed: replies.iter().filter(|reply| !reply.is_ok()).count(),
            replies: replies.iter().map(ReplyOutput::from).collect(),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["#", "GROUP", "ID", "RESULT", "WORDS"]);
            for (index, reply) in replies.iter().enumerate() {
                let out = ReplyOutput::from(reply);
                table.add_row(vec![
                    index.to_string(),
                    out.group,
                    format!("0x{:x}", out.id),
                    out.error.unwrap_or_else(|| "ok".to_string()),
                    render_words(&out.words),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for reply in replies {
                match &reply.result {
                    Ok(words) => println!("{}: ok {}", reply.header, render_words(words)),
                    Err(err) => println!("{}: error: {err}", reply.header),
                }
            }
        }
        OutputFormat::Raw => {
            let words: Vec<u32> = replies.iter().flat_map(|r| r.words().to_vec()).collect();
            print_raw(&le_bytes(&words));
        }
    }
}

fn render_words(words: &[u32]) -> String {
    words
        .iter()
        .map(|word| hex(*word, 4))
        .collect::<Vec<_>>()
        .join(" ")
}

fn le_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcuprims_router::{CommandHeader, Group, RouterError};

    fn reply(result: rcuprims_router::Result<Vec<u32>>) -> Reply {
        Reply {
            header: CommandHeader::new(Group::RcuMemory, 1),
            result,
        }
    }

    #[test]
    fn first_failure_sets_exit_code() {
        assert_eq!(exit_code(&[reply(Ok(vec![1]))]), SUCCESS);

        let replies = [
            reply(Ok(vec![])),
            reply(Err(RouterError::InvalidArgument("mode code 9".into()))),
            reply(Err(RouterError::Channel(rcuprims_msgbuf::MsgBufError::Busy))),
        ];
        assert_eq!(exit_code(&replies), crate::exit::DATA_INVALID);
    }

    #[test]
    fn words_are_little_endian() {
        assert_eq!(le_bytes(&[0x0403_0201]), vec![1, 2, 3, 4]);
    }
}
