//! A tiny stand-in for the REPL, written in POSIX sh. It prints the same two
//! prompts and answers the handful of commands the tests send.

use tokio::process::Command;

use crate::ReplSession;

pub(crate) const FAKE_REPL: &str = r#"
printf 'fake repl\n>> '
mode=shell
while IFS= read -r line; do
  case "$line" in
    "cd /missing"*) printf "Error using cd\nCannot CD to /missing (Name is nonexistent or not a directory).\n" >&2; sleep 0.2 ;;
    "dbstop in missing.m"*) printf "Error using dbstop\nFile missing.m not found.\n" >&2; sleep 0.2 ;;
    'run('*) mode=debug; printf 'Breakpoint for script is on line 5\n' ;;
    dbcont) mode=shell ;;
    dbstep) [ "$mode" = debug ] && printf '6   y = x + 1;\n' ;;
    "dbstack('-completenames')") [ "$mode" = debug ] && printf 'In /work/script.m (line 6)\nIn /work/main.m (line 2)\n' ;;
    dbstatus*) printf 'Breakpoint for script is on line 5,9.\n' ;;
    x) printf '\nx =\n\n     5\n\n' ;;
    v) printf '\nv =\n\n  Columns 1 through 3\n\n    1.0000    2.0000    3.0000\n\n  Columns 4 and 5\n\n    4.0000    5.0000\n\n' ;;
    bad*) printf "Undefined function 'bad'.\n" >&2; sleep 0.2 ;;
    exit) exit 0 ;;
  esac
  if [ "$mode" = debug ]; then printf 'K>> '; else printf '>> '; fi
done
"#;

pub(crate) async fn fake_session() -> ReplSession {
    let mut command = Command::new("sh");
    command.args(["-c", FAKE_REPL]);
    ReplSession::spawn_command(command)
        .await
        .expect("fake REPL should spawn")
}
