//! One-shot HTTP endpoint for exercising the HTTP clients in tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Accept one request on a local port, answer with `status` and `body`, and hand back the
/// raw request text.
pub async fn serve_once(status: &'static str, body: Vec<u8>) -> (String, JoinHandle<String>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let base = format!("http://{}/", listener.local_addr().unwrap());

	let handle = tokio::spawn(async move {
		let (mut socket, _) = listener.accept().await.unwrap();
		let request = read_request(&mut socket).await;

		let head = format!(
			"HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
			status,
			body.len()
		);
		socket.write_all(head.as_bytes()).await.unwrap();
		socket.write_all(&body).await.unwrap();
		socket.shutdown().await.unwrap();
		request
	});

	(base, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
	let mut buffer = Vec::new();
	let mut chunk = [0u8; 4096];
	loop {
		let read = socket.read(&mut chunk).await.unwrap();
		if read == 0 {
			break;
		}
		buffer.extend_from_slice(&chunk[..read]);

		let text = String::from_utf8_lossy(&buffer);
		if let Some(header_end) = text.find("\r\n\r\n") {
			let content_length = text[..header_end]
				.lines()
				.find_map(|line| {
					let (name, value) = line.split_once(':')?;
					name.eq_ignore_ascii_case("content-length")
						.then(|| value.trim().parse::<usize>().ok())
						.flatten()
				})
				.unwrap_or(0);
			if buffer.len() >= header_end + 4 + content_length {
				break;
			}
		}
	}
	String::from_utf8_lossy(&buffer).into_owned()
}
