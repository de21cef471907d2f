//! Wire-Format fuer TCP-Verbindungen
//!
//! Beide Protokolle sind zeilenbasiert. Die Rahmung uebernimmt
//! `tokio_util::codec::LinesCodec` mit einer festen Maximallaenge, damit ein
//! Client ohne Zeilenende den Server nicht mit unbegrenztem Puffer belegt.
//!
//! ```rust,no_run
//! use tokio_util::codec::Framed;
//! use portier_protocol::wire::zeilen_codec;
//!
//! // let stream = TcpStream::connect(...).await?;
//! // let framed = Framed::new(stream, zeilen_codec());
//! ```

use tokio_util::codec::LinesCodec;

/// Maximale Zeilenlaenge in Bytes (ohne `\n`)
pub const MAX_ZEILENLAENGE: usize = 1024;

/// Zeilen-Codec mit Standard-Limit
pub fn zeilen_codec() -> LinesCodec {
    LinesCodec::new_with_max_length(MAX_ZEILENLAENGE)
}

/// Zeilen-Codec mit benutzerdefiniertem Limit
pub fn zeilen_codec_mit_limit(max_laenge: usize) -> LinesCodec {
    LinesCodec::new_with_max_length(max_laenge)
}
