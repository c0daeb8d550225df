/// Ask the OS for a free TCP port on the loopback interface.
///
/// The listener is dropped before the port is returned, so another process
/// can grab the same port before the caller binds it. The window is small
/// and a collision only makes the installer's embedded service fail to
/// start, which surfaces as an install generation error.
pub async fn reserve_ephemeral_port() -> std::io::Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    #[tokio::test]
    async fn returns_a_bindable_port() {
        let port = super::reserve_ephemeral_port().await.unwrap();
        assert_ne!(port, 0);
        tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .unwrap();
    }
}
