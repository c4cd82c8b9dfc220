// Minimal blocking POP3 client: just the five commands the check needs
// (greeting, USER, PASS, STAT, DELE, QUIT), every socket operation bounded
// by the invocation-wide deadline.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use error_stack::{Report, Result, ResultExt};
use secrecy::ExposeSecret;
use tracing::{debug, trace};

use crate::check::MailboxSession;
use crate::configuration::CheckConfig;
use crate::errors::CheckError;

const POP3_PORT: u16 = 110;

/// An authenticated plaintext POP3 session.  The password is never stored
/// here; it is consumed at the PASS command during connect.
#[derive(Debug)]
pub struct Pop3Session {
    reader: BufReader<TcpStream>,
    host: String,
    deadline: Instant,
    timeout_secs: u64,
}

impl Pop3Session {
    /// Connects and logs in.  Any failure up to and including PASS comes
    /// back as a `Connection` error naming the host.
    #[tracing::instrument(skip(config), fields(host = %config.host))]
    pub fn connect(config: &CheckConfig) -> Result<Self, CheckError> {
        Self::connect_to(
            &config.host,
            POP3_PORT,
            &config.username,
            config.password.expose_secret(),
            config.timeout,
        )
    }

    fn connect_to(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, CheckError> {
        let deadline = Instant::now() + timeout;
        let timeout_secs = timeout.as_secs();

        // Name resolution is the one blocking step std cannot bound with a
        // timeout; a stuck resolver can outlast the deadline.  Everything
        // from the TCP connect onward is deadline-bounded.
        let addrs = (host, port)
            .to_socket_addrs()
            .change_context_lazy(|| CheckError::Connection(host.to_string()))
            .attach_printable("host name did not resolve")?;

        let mut stream = None;
        let mut last_error = None;
        for addr in addrs {
            let remaining = remaining_before(deadline, timeout_secs)?;
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(connected) => {
                    debug!("connected to {addr}");
                    stream = Some(connected);
                    break;
                }
                Err(connect_error) => last_error = Some(connect_error),
            }
        }

        let stream = match (stream, last_error) {
            (Some(stream), _) => stream,
            (None, Some(connect_error)) => {
                return Err(Report::new(connect_error)
                    .change_context(CheckError::Connection(host.to_string())));
            }
            (None, None) => {
                return Err(Report::new(CheckError::Connection(host.to_string()))
                    .attach_printable("host name resolved to no addresses"));
            }
        };

        let mut session = Pop3Session {
            reader: BufReader::new(stream),
            host: host.to_string(),
            deadline,
            timeout_secs,
        };

        // The server speaks first.
        session.read_response()?;
        session.command(&format!("USER {username}"))?;
        session.command(&format!("PASS {password}"))?;

        Ok(session)
    }

    /// Sends one command line and reads the single-line response.  Returns
    /// the text after `+OK`.
    fn command(&mut self, line: &str) -> Result<String, CheckError> {
        self.arm_deadline()?;

        if line.starts_with("PASS") {
            trace!("C: PASS ********");
        } else {
            trace!("C: {line}");
        }

        let written = {
            let stream = self.reader.get_mut();
            stream
                .write_all(line.as_bytes())
                .and_then(|()| stream.write_all(b"\r\n"))
        };
        written.map_err(|io_error| self.wrap_io_error(io_error))?;

        self.read_response()
    }

    fn read_response(&mut self) -> Result<String, CheckError> {
        self.arm_deadline()?;

        let mut line = String::new();
        let read = self.reader.read_line(&mut line);
        let bytes = read.map_err(|io_error| self.wrap_io_error(io_error))?;
        if bytes == 0 {
            return Err(Report::new(CheckError::Connection(self.host.clone()))
                .attach_printable("server closed the connection"));
        }

        let line = line.trim_end().to_string();
        trace!("S: {line}");

        match line.strip_prefix("+OK") {
            Some(rest) => Ok(rest.trim_start().to_string()),
            None => Err(Report::new(CheckError::Connection(self.host.clone()))
                .attach_printable(format!("server replied '{line}'"))),
        }
    }

    /// Caps the next socket operation at whatever is left of the overall
    /// invocation deadline.
    fn arm_deadline(&self) -> Result<(), CheckError> {
        let remaining = remaining_before(self.deadline, self.timeout_secs)?;
        let stream = self.reader.get_ref();
        stream
            .set_read_timeout(Some(remaining))
            .and_then(|()| stream.set_write_timeout(Some(remaining)))
            .change_context_lazy(|| CheckError::Connection(self.host.clone()))?;
        Ok(())
    }

    fn wrap_io_error(&self, io_error: io::Error) -> Report<CheckError> {
        if matches!(
            io_error.kind(),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
        ) {
            Report::new(CheckError::Timeout(self.timeout_secs))
        } else {
            Report::new(io_error).change_context(CheckError::Connection(self.host.clone()))
        }
    }
}

fn remaining_before(deadline: Instant, timeout_secs: u64) -> Result<Duration, CheckError> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
        .ok_or_else(|| Report::new(CheckError::Timeout(timeout_secs)))
}

impl MailboxSession for Pop3Session {
    fn count(&mut self) -> Result<u32, CheckError> {
        let stat = self.command("STAT")?;
        let token = stat.split_whitespace().next().ok_or_else(|| {
            Report::new(CheckError::Connection(self.host.clone()))
                .attach_printable(format!("malformed STAT response '{stat}'"))
        })?;

        let signed = token
            .parse::<i64>()
            .change_context_lazy(|| CheckError::Connection(self.host.clone()))
            .attach_printable_lazy(|| format!("malformed STAT response '{stat}'"))?;

        // Some servers report a negative count for a maildrop they could not
        // open; that is a connection failure, never a real count.
        if signed < 0 {
            return Err(Report::new(CheckError::Connection(self.host.clone()))
                .attach_printable(format!("server reported {signed} messages")));
        }

        u32::try_from(signed)
            .change_context_lazy(|| CheckError::Connection(self.host.clone()))
            .attach_printable_lazy(|| format!("message count {signed} out of range"))
    }

    fn delete(&mut self, index: u32) -> Result<(), CheckError> {
        self.command(&format!("DELE {index}"))?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), CheckError> {
        // QUIT commits pending DELE marks and releases the maildrop lock.
        self.command("QUIT")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{SocketAddr, TcpListener};
    use std::thread::{self, JoinHandle};

    /// A one-connection POP3 server that answers from a fixed script and
    /// hands back the commands it received.
    fn scripted_server(stat_reply: &'static str) -> (SocketAddr, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            stream.write_all(b"+OK scripted server ready\r\n").unwrap();

            let mut commands = Vec::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 {
                    break;
                }
                let line = line.trim_end().to_string();
                let reply = match line.split_whitespace().next().unwrap_or("") {
                    "USER" | "PASS" | "DELE" => "+OK",
                    "STAT" => stat_reply,
                    "QUIT" => "+OK bye",
                    _ => "-ERR unknown command",
                };
                let done = line.starts_with("QUIT");
                commands.push(line);
                stream.write_all(format!("{reply}\r\n").as_bytes()).unwrap();
                if done {
                    break;
                }
            }
            commands
        });

        (addr, handle)
    }

    fn connect(addr: SocketAddr) -> Result<Pop3Session, CheckError> {
        Pop3Session::connect_to(
            &addr.ip().to_string(),
            addr.port(),
            "fred",
            "hunter2",
            Duration::from_secs(5),
        )
    }

    #[test]
    fn logs_in_counts_deletes_and_quits() {
        let (addr, server) = scripted_server("+OK 3 420");

        let mut session = connect(addr).unwrap();
        assert_eq!(session.count().unwrap(), 3);
        session.delete(1).unwrap();
        session.close().unwrap();

        let commands = server.join().unwrap();
        assert_eq!(
            commands,
            vec!["USER fred", "PASS hunter2", "STAT", "DELE 1", "QUIT"]
        );
    }

    #[test]
    fn negative_stat_count_is_a_connection_error() {
        let (addr, server) = scripted_server("+OK -1 0");

        let mut session = connect(addr).unwrap();
        let err = session.count().unwrap_err();
        assert!(matches!(err.current_context(), CheckError::Connection(_)));

        session.close().unwrap();
        server.join().unwrap();
    }

    #[test]
    fn non_numeric_stat_count_is_a_connection_error() {
        let (addr, server) = scripted_server("+OK many 0");

        let mut session = connect(addr).unwrap();
        let err = session.count().unwrap_err();
        assert!(matches!(err.current_context(), CheckError::Connection(_)));

        session.close().unwrap();
        server.join().unwrap();
    }

    #[test]
    fn err_reply_names_the_host() {
        let (addr, server) = scripted_server("-ERR maildrop locked");

        let mut session = connect(addr).unwrap();
        let err = session.count().unwrap_err();
        let host = addr.ip().to_string();
        assert!(matches!(
            err.current_context(),
            CheckError::Connection(reported) if *reported == host
        ));

        session.close().unwrap();
        server.join().unwrap();
    }

    #[test]
    fn unreachable_host_is_a_connection_error() {
        // Bind a listener and drop it so the port is known to be closed.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let err = connect(addr).unwrap_err();
        assert!(matches!(err.current_context(), CheckError::Connection(_)));
    }

    #[test]
    fn expired_deadline_is_a_timeout() {
        let (addr, _server) = scripted_server("+OK 0 0");

        let err = Pop3Session::connect_to(
            &addr.ip().to_string(),
            addr.port(),
            "fred",
            "hunter2",
            Duration::ZERO,
        )
        .unwrap_err();
        assert!(matches!(err.current_context(), CheckError::Timeout(0)));
    }
}
