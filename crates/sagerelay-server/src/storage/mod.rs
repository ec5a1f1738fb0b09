//! S3 storage access
//!
//! Clients are constructed per request from caller-supplied credentials and
//! are not pooled. Uploads stream through a multipart upload so the dataset
//! is never buffered whole; the reader is only pulled as fast as S3 accepts
//! parts.

use anyhow::{anyhow, Context, Result};
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};
use tracing::{debug, info, instrument, warn};

/// Region used when a bucket reports no location constraint.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Size of each multipart upload part. Bounds memory use per transaction.
const PART_SIZE: usize = 8 * 1024 * 1024;

/// Caller-supplied AWS credentials, carried with each submission request.
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
}

impl Storage {
    /// Build an S3 client for one request.
    ///
    /// `endpoint` overrides the S3 endpoint for MinIO-style deployments and
    /// tests; path-style addressing is enabled whenever it is set.
    pub fn for_request(
        credentials: &AwsCredentials,
        region: &str,
        endpoint: Option<&str>,
    ) -> Self {
        let creds = Credentials::new(
            &credentials.access_key_id,
            &credentials.secret_access_key,
            None,
            None,
            "sagerelay",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(creds)
            .region(Region::new(region.to_string()))
            .force_path_style(endpoint.is_some());

        if let Some(endpoint) = endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(s3_config_builder.build()),
        }
    }

    /// Resolve the region a bucket lives in.
    ///
    /// An empty location constraint means us-east-1.
    #[instrument(skip(self))]
    pub async fn bucket_region(&self, bucket: &str) -> Result<String> {
        let response = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .with_context(|| format!("Unable to determine region for bucket: {}", bucket))?;

        let region = response
            .location_constraint()
            .map(|c| c.as_str().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        debug!(bucket, region, "Resolved bucket region");

        Ok(region)
    }

    /// Stream `reader` into `s3://{bucket}/{key}` as a multipart upload.
    ///
    /// Returns the number of bytes uploaded. The multipart upload is aborted
    /// on any failure; an empty stream is an error because a training channel
    /// with no rows is never valid.
    #[instrument(skip(self, reader))]
    pub async fn upload_stream<R>(&self, bucket: &str, key: &str, reader: R) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let create = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type("text/csv")
            .send()
            .await
            .context("Failed to start multipart upload")?;

        let upload_id = create
            .upload_id()
            .ok_or_else(|| anyhow!("S3 did not return a multipart upload id"))?
            .to_string();

        let uploaded = match self.upload_parts(bucket, key, &upload_id, reader).await {
            Ok((_, 0)) => {
                self.abort_upload(bucket, key, &upload_id).await;
                return Err(anyhow!("Dataset contained no rows after the header"));
            },
            Ok((parts, total)) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder().set_parts(Some(parts)).build(),
                    )
                    .send()
                    .await
                    .context("Failed to complete multipart upload")?;
                total
            },
            Err(e) => {
                self.abort_upload(bucket, key, &upload_id).await;
                return Err(e);
            },
        };

        info!(bucket, key, bytes = uploaded, "Uploaded dataset to S3");

        Ok(uploaded)
    }

    async fn upload_parts<R>(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        mut reader: R,
    ) -> Result<(Vec<CompletedPart>, u64)>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut parts = Vec::new();
        let mut part_number = 1i32;
        let mut total = 0u64;

        loop {
            let mut part = Vec::with_capacity(PART_SIZE);
            let n = (&mut reader)
                .take(PART_SIZE as u64)
                .read_to_end(&mut part)
                .await
                .context("Failed to read dataset stream")?;

            if n == 0 {
                break;
            }
            total += n as u64;

            debug!(part_number, bytes = n, "Uploading part");

            let uploaded = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part))
                .send()
                .await
                .with_context(|| format!("Failed to upload part {}", part_number))?;

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .build(),
            );
            part_number += 1;
        }

        Ok((parts, total))
    }

    async fn abort_upload(&self, bucket: &str, key: &str, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            warn!(bucket, key, error = %e, "Failed to abort multipart upload");
        }
    }
}

/// Consume the header line of a row-oriented stream before any byte reaches
/// the sink, returning the number of fields it declared.
///
/// The remainder of `reader` starts at the first data row.
pub async fn strip_header_line<R>(reader: &mut R) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut header = Vec::new();
    let n = reader.read_until(b'\n', &mut header).await?;

    if n == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "dataset stream is empty",
        ));
    }

    while matches!(header.last(), Some(b'\n') | Some(b'\r')) {
        header.pop();
    }

    Ok(header.split(|b| *b == b',').count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_strip_header_counts_fields() {
        let data: &[u8] = b"label,f1,f2,f3\n1,0.5,0.2,0.9\n";
        let mut reader = BufReader::new(data);

        let fields = strip_header_line(&mut reader).await.unwrap();
        assert_eq!(fields, 4);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"1,0.5,0.2,0.9\n");
    }

    #[tokio::test]
    async fn test_strip_header_handles_crlf() {
        let data: &[u8] = b"label,f1\r\n1,0.5\r\n";
        let mut reader = BufReader::new(data);

        let fields = strip_header_line(&mut reader).await.unwrap();
        assert_eq!(fields, 2);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"1,0.5\r\n");
    }

    #[tokio::test]
    async fn test_strip_header_without_trailing_newline() {
        // A stream that is all header: nothing remains for the sink.
        let data: &[u8] = b"label,f1,f2";
        let mut reader = BufReader::new(data);

        let fields = strip_header_line(&mut reader).await.unwrap();
        assert_eq!(fields, 3);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_strip_header_empty_stream_is_error() {
        let data: &[u8] = b"";
        let mut reader = BufReader::new(data);

        let err = strip_header_line(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
