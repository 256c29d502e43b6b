use rand::RngCore;

/// A `multipart/form-data` body carrying a single file field.
pub struct MultipartBody {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn single_file(field: &str, filename: &str, mime: &str, bytes: &[u8]) -> Self {
        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self::with_boundary(
            format!("scope-monitor-{}", hex::encode(nonce)),
            field,
            filename,
            mime,
            bytes,
        )
    }

    fn with_boundary(
        boundary: String,
        field: &str,
        filename: &str,
        mime: &str,
        bytes: &[u8],
    ) -> Self {
        let mut body = Vec::with_capacity(bytes.len() + 256);
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime).as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        Self { boundary, body }
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_has_one_field_framed_by_the_boundary() {
        let part = MultipartBody::with_boundary(
            "XYZ".to_string(),
            "image",
            "frame.jpg",
            "image/jpeg",
            b"\xFF\xD8jpeg\xFF\xD9",
        );
        assert_eq!(part.content_type(), "multipart/form-data; boundary=XYZ");
        let expected = b"--XYZ\r\n\
Content-Disposition: form-data; name=\"image\"; filename=\"frame.jpg\"\r\n\
Content-Type: image/jpeg\r\n\r\n\
\xFF\xD8jpeg\xFF\xD9\r\n--XYZ--\r\n";
        assert_eq!(part.as_bytes(), &expected[..]);
    }

    #[test]
    fn random_boundaries_differ() {
        let a = MultipartBody::single_file("image", "frame.jpg", "image/jpeg", b"x");
        let b = MultipartBody::single_file("image", "frame.jpg", "image/jpeg", b"x");
        assert_ne!(a.content_type(), b.content_type());
    }
}
