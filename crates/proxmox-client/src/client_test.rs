//! Unit tests for the REST endpoint client, served by a local HTTP stub

#[cfg(test)]
mod tests {
    use crate::{Credentials, EndpointTransport, ProxmoxEndpoint, ProxmoxError, Upid};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// One request as seen by the stub
    #[derive(Debug, Clone)]
    struct Recorded {
        method: String,
        path: String,
        headers: Vec<(String, String)>,
        body: String,
    }

    impl Recorded {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        }
    }

    struct Stub {
        url: String,
        requests: Arc<Mutex<Vec<Recorded>>>,
    }

    impl Stub {
        fn requests(&self) -> Vec<Recorded> {
            self.requests.lock().unwrap().clone()
        }
    }

    /// Serves the given (status, body) replies in order, one per connection.
    async fn serve(replies: Vec<(u16, &'static str)>) -> Stub {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        tokio::spawn(async move {
            for (status, body) in replies {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let request = read_request(&mut socket).await;
                log.lock().unwrap().push(request);

                let reply = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason(status),
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        Stub { url, requests }
    }

    async fn read_request(socket: &mut TcpStream) -> Recorded {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        let header_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before request headers");
            buf.extend_from_slice(&chunk[..n]);
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.split("\r\n");
        let mut request_line = lines.next().unwrap_or_default().split_whitespace();
        let method = request_line.next().unwrap_or_default().to_string();
        let path = request_line.next().unwrap_or_default().to_string();
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();

        let content_length = headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before request body");
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = String::from_utf8_lossy(&buf[header_end..header_end + content_length]).to_string();

        Recorded {
            method,
            path,
            headers,
            body,
        }
    }

    fn reason(status: u16) -> &'static str {
        match status {
            200 => "OK",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            _ => "Internal Server Error",
        }
    }

    fn token() -> Credentials {
        Credentials::Token {
            token_id: "sync@pve!name-sync".to_string(),
            secret: "0f6c-secret".to_string(),
        }
    }

    fn password() -> Credentials {
        Credentials::Password {
            username: "root@pam".to_string(),
            password: "hunter2".to_string(),
        }
    }

    const VERSION: &str = r#"{"data":{"version":"8.2.4","release":"8.2"}}"#;
    const TICKET_1: &str = r#"{"data":{"ticket":"PVE:root@pam:TICKET1","CSRFPreventionToken":"CSRF1","username":"root@pam"}}"#;
    const TICKET_2: &str = r#"{"data":{"ticket":"PVE:root@pam:TICKET2","CSRFPreventionToken":"CSRF2","username":"root@pam"}}"#;

    #[tokio::test]
    async fn test_token_authorization_header() {
        let stub = serve(vec![(200, VERSION)]).await;
        let endpoint = ProxmoxEndpoint::new(&stub.url, token(), false).unwrap();

        let version = endpoint.version().await.unwrap();

        assert_eq!(version.version, "8.2.4");
        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, "/api2/json/version");
        assert_eq!(
            requests[0].header("authorization"),
            Some("PVEAPIToken=sync@pve!name-sync=0f6c-secret")
        );
        assert_eq!(requests[0].header("cookie"), None);
    }

    #[tokio::test]
    async fn test_ticket_cookie_and_csrf_only_on_writes() {
        let stub = serve(vec![
            (200, TICKET_1),
            (200, VERSION),
            (200, r#"{"data":"UPID:pve1:00001234:qmconfig:100:root@pam:"}"#),
        ])
        .await;
        let endpoint = ProxmoxEndpoint::new(&stub.url, password(), false).unwrap();

        endpoint.version().await.unwrap();
        let upid = endpoint.set_guest_name("pve1", 100, "worker-01").await.unwrap();

        assert_eq!(upid, Upid("UPID:pve1:00001234:qmconfig:100:root@pam:".to_string()));
        let requests = stub.requests();
        assert_eq!(requests.len(), 3, "ticket is cached between requests");

        let login = &requests[0];
        assert_eq!(login.method, "POST");
        assert_eq!(login.path, "/api2/json/access/ticket");
        assert!(login.body.contains("username=root%40pam"));
        assert!(login.body.contains("password=hunter2"));

        let read = &requests[1];
        assert_eq!(read.header("cookie"), Some("PVEAuthCookie=PVE:root@pam:TICKET1"));
        assert_eq!(read.header("csrfpreventiontoken"), None);

        let write = &requests[2];
        assert_eq!(write.method, "POST");
        assert_eq!(write.path, "/api2/json/nodes/pve1/qemu/100/config");
        assert_eq!(write.body, "name=worker-01");
        assert_eq!(write.header("cookie"), Some("PVEAuthCookie=PVE:root@pam:TICKET1"));
        assert_eq!(write.header("csrfpreventiontoken"), Some("CSRF1"));
    }

    #[tokio::test]
    async fn test_expired_ticket_is_renewed_once() {
        let stub = serve(vec![
            (200, TICKET_1),
            (401, "ticket expired"),
            (200, TICKET_2),
            (200, VERSION),
        ])
        .await;
        let endpoint = ProxmoxEndpoint::new(&stub.url, password(), false).unwrap();

        endpoint.version().await.unwrap();

        let requests = stub.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[2].path, "/api2/json/access/ticket");
        assert_eq!(requests[3].header("cookie"), Some("PVEAuthCookie=PVE:root@pam:TICKET2"));
    }

    #[tokio::test]
    async fn test_second_rejection_after_renewal_is_not_retried() {
        let stub = serve(vec![
            (200, TICKET_1),
            (401, "ticket expired"),
            (200, TICKET_2),
            (401, "permission denied"),
        ])
        .await;
        let endpoint = ProxmoxEndpoint::new(&stub.url, password(), false).unwrap();

        let err = endpoint.version().await.unwrap_err();

        assert!(matches!(err, ProxmoxError::Authentication { .. }));
        assert_eq!(stub.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_token_rejection_is_not_retried() {
        let stub = serve(vec![(401, "invalid token"), (200, VERSION)]).await;
        let endpoint = ProxmoxEndpoint::new(&stub.url, token(), false).unwrap();

        let err = endpoint.version().await.unwrap_err();

        match err {
            ProxmoxError::Authentication { message, .. } => assert!(message.contains("invalid token")),
            other => panic!("expected authentication error, got {:?}", other),
        }
        assert_eq!(stub.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        let stub = serve(vec![
            (403, "permission denied"),
            (404, "no such VM"),
            (500, "internal failure"),
        ])
        .await;
        let endpoint = ProxmoxEndpoint::new(&stub.url, token(), false).unwrap();

        let forbidden = endpoint.list_nodes().await.unwrap_err();
        assert!(matches!(forbidden, ProxmoxError::Authentication { .. }));

        let missing = endpoint.guest_config("pve1", 999).await.unwrap_err();
        assert!(matches!(missing, ProxmoxError::NotFound { .. }));

        match endpoint.list_guests("pve1").await.unwrap_err() {
            ProxmoxError::Api { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "internal failure");
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_data_envelope_is_unwrapped() {
        let stub = serve(vec![
            (200, r#"{"data":null}"#),
            (200, r#"{"data":{"name":"worker-01","smbios1":"uuid=3b9a6d0e,manufacturer=QEMU","digest":"abc"}}"#),
            (200, r#"{"data":[{"vmid":100,"name":"worker-01","status":"running"},{"vmid":"101"}]}"#),
            (200, r#"{"data":{"status":"stopped","exitstatus":"OK"}}"#),
        ])
        .await;
        let endpoint = ProxmoxEndpoint::new(&stub.url, token(), false).unwrap();

        assert_eq!(endpoint.guest_config("pve1", 100).await.unwrap(), None);

        let config = endpoint.guest_config("pve1", 100).await.unwrap().unwrap();
        assert_eq!(config.name.as_deref(), Some("worker-01"));
        assert_eq!(config.smbios1.as_deref(), Some("uuid=3b9a6d0e,manufacturer=QEMU"));

        let guests = endpoint.list_guests("pve1").await.unwrap();
        assert_eq!(guests.iter().map(|g| g.vmid).collect::<Vec<_>>(), vec![100, 101]);

        let upid = Upid("UPID:pve1:00001234:qmconfig:100:root@pam:".to_string());
        let status = endpoint.task_status("pve1", &upid).await.unwrap();
        assert!(status.is_ok());

        let requests = stub.requests();
        assert_eq!(requests[0].path, "/api2/json/nodes/pve1/qemu/100/config");
        assert_eq!(
            requests[3].path,
            "/api2/json/nodes/pve1/tasks/UPID%3Apve1%3A00001234%3Aqmconfig%3A100%3Aroot%40pam%3A/status"
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_is_serialization_error() {
        let stub = serve(vec![(200, r#"{"data":{"unexpected":true}}"#)]).await;
        let endpoint = ProxmoxEndpoint::new(&stub.url, token(), false).unwrap();

        let err = endpoint.version().await.unwrap_err();

        assert!(matches!(err, ProxmoxError::Serialization { .. }));
    }
}
