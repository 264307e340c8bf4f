//! Transport that shells out to the `sqlcmd` tool.

use crate::error::{Error, Result};
use crate::transport::{Row, Transport};
use crate::types::Target;
use std::io::Write;
use std::process::{Command, Stdio};

/// Column separator passed to `sqlcmd -s`; never appears in identifiers.
const SEPARATOR: char = '\u{1f}';

/// Default TCP port of the engine.
pub const DEFAULT_PORT: u16 = 1433;

/// How the connecting principal authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    /// SQL authentication with username and password
    Sql { username: String, password: String },
    /// Directory authentication using the ambient default credential chain
    AzureDefault,
}

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub hostname: String,
    pub port: u16,
    pub authentication: Authentication,
    /// Accept the server certificate without validation
    pub trust_server_certificate: bool,
}

/// Backend that runs each statement through `sqlcmd`.
pub struct SqlcmdTransport {
    program: String,
    settings: ConnectionSettings,
}

impl SqlcmdTransport {
    /// Create a transport using `sqlcmd` from `PATH`.
    pub fn new(settings: ConnectionSettings) -> Self {
        Self::with_program("sqlcmd", settings)
    }

    /// Create a transport using an explicit `sqlcmd` executable.
    pub fn with_program(program: impl Into<String>, settings: ConnectionSettings) -> Self {
        Self {
            program: program.into(),
            settings,
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Build the argument list for one invocation. The statement itself is
    /// fed on stdin so literals such as passwords stay out of the process list.
    fn args(&self, target: &Target) -> Vec<String> {
        let mut args = vec![
            "-S".to_string(),
            format!("{},{}", self.settings.hostname, self.settings.port),
        ];

        match &self.settings.authentication {
            Authentication::Sql { username, .. } => {
                args.push("-U".into());
                args.push(username.clone());
            }
            Authentication::AzureDefault => {
                args.push("--authentication-method".into());
                args.push("ActiveDirectoryDefault".into());
            }
        }

        if self.settings.trust_server_certificate {
            args.push("-C".into());
        }

        if let Some(database) = target.database() {
            args.push("-d".into());
            args.push(database.to_string());
        }

        // -b: non-zero exit on error, -r 1: errors to stderr,
        // -h -1: no headers, -W: trim trailing spaces,
        // -x: no $(var) substitution inside statements
        args.extend(
            ["-b", "-r", "1", "-h", "-1", "-W", "-x", "-s"]
                .iter()
                .map(ToString::to_string),
        );
        args.push(SEPARATOR.to_string());
        args.push("-i".into());
        args.push("/dev/stdin".into());
        args
    }

    fn run(&self, target: &Target, sql: &str) -> Result<std::process::Output> {
        let unavailable = |e: std::io::Error| Error::ConnectionUnavailable {
            message: format!("failed to execute {}: {e}", self.program),
        };

        let mut command = Command::new(&self.program);
        command
            .args(self.args(target))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Authentication::Sql { password, .. } = &self.settings.authentication {
            command.env("SQLCMDPASSWORD", password);
        }

        log::trace!("{} -> {}", target, sql);

        let mut child = command.spawn().map_err(unavailable)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script(sql).as_bytes()).map_err(unavailable)?;
        }
        child.wait_with_output().map_err(unavailable)
    }
}

impl Transport for SqlcmdTransport {
    fn query(&self, target: &Target, sql: &str) -> Result<Vec<Row>> {
        let output = self.run(target, sql)?;

        if !output.status.success() {
            let mut message = String::from_utf8_lossy(&output.stderr).to_string();
            if message.trim().is_empty() {
                message = String::from_utf8_lossy(&output.stdout).to_string();
            }
            return Err(Error::from_engine_output(&message, sql));
        }

        Ok(parse_rows(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// One batch as read from stdin.
fn script(sql: &str) -> String {
    format!("SET NOCOUNT ON;\n{sql}\nGO\n")
}

/// Parse headerless, separator-delimited `sqlcmd` output.
fn parse_rows(stdout: &str) -> Vec<Row> {
    stdout
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            Row::new(
                line.split(SEPARATOR)
                    .map(|cell| match cell {
                        "NULL" => None,
                        other => Some(other.to_string()),
                    })
                    .collect(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(authentication: Authentication) -> ConnectionSettings {
        ConnectionSettings {
            hostname: "db.internal".into(),
            port: DEFAULT_PORT,
            authentication,
            trust_server_certificate: false,
        }
    }

    #[test]
    fn test_args_sql_auth_server_target() {
        let transport = SqlcmdTransport::new(settings(Authentication::Sql {
            username: "sa".into(),
            password: "secret".into(),
        }));
        let args = transport.args(&Target::Server);

        assert_eq!(&args[..4], &["-S", "db.internal,1433", "-U", "sa"]);
        assert!(!args.contains(&"-d".to_string()));
        assert!(!args.iter().any(|a| a.contains("secret")));
        assert_eq!(&args[args.len() - 2..], &["-i", "/dev/stdin"]);
    }

    #[test]
    fn test_statements_stay_off_the_command_line() {
        let transport = SqlcmdTransport::new(settings(Authentication::AzureDefault));
        let args = transport.args(&Target::Server);
        assert!(args.contains(&"-x".to_string()));
        assert!(!args.contains(&"-Q".to_string()));

        let sql = "CREATE LOGIN [app] WITH PASSWORD = N'Pa$(x)ss-123'";
        assert!(!args.iter().any(|a| a.contains("PASSWORD")));
        assert_eq!(
            script(sql),
            "SET NOCOUNT ON;\nCREATE LOGIN [app] WITH PASSWORD = N'Pa$(x)ss-123'\nGO\n"
        );
    }

    #[test]
    fn test_args_database_target_and_azure() {
        let mut s = settings(Authentication::AzureDefault);
        s.trust_server_certificate = true;
        let transport = SqlcmdTransport::new(s);
        let args = transport.args(&Target::Database("app".into()));

        let d = args.iter().position(|a| a == "-d").unwrap();
        assert_eq!(args[d + 1], "app");
        assert!(args.contains(&"ActiveDirectoryDefault".to_string()));
        assert!(args.contains(&"-C".to_string()));
    }

    #[test]
    fn test_parse_rows() {
        let out = format!("5{SEPARATOR}app{SEPARATOR}NULL\r\n\n7{SEPARATOR}ops{SEPARATOR}dbo\n");
        let rows = parse_rows(&out);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_i32(0).unwrap(), 5);
        assert_eq!(rows[0].get_opt_str(2).unwrap(), None);
        assert_eq!(rows[1].get_str(2).unwrap(), "dbo");
    }

    #[test]
    fn test_missing_program_is_connection_error() {
        let transport = SqlcmdTransport::with_program(
            "/nonexistent/sqlcmd-for-tests",
            settings(Authentication::AzureDefault),
        );
        let err = transport.query(&Target::Server, "SELECT 1").unwrap_err();
        assert!(matches!(err, Error::ConnectionUnavailable { .. }));
    }
}
