//! Default values for configuration

/// Default maximum characters per chunk
pub fn default_chunk_size() -> usize {
    500
}

/// Default overlap characters between chunks
pub fn default_chunk_overlap() -> usize {
    50
}

/// Default embedding backend URL
pub fn default_embedding_backend_url() -> String {
    std::env::var("ARCHIVIST_EMBEDDING_BACKEND_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7997".to_string())
}

/// Default embedding model key
pub fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

/// Default embedding dimension (matches the default model)
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default batch size on the accelerator
pub fn default_accelerator_batch_size() -> usize {
    32
}

/// Default batch size on the general-purpose processor
pub fn default_cpu_batch_size() -> usize {
    8
}

/// Chunk-count ceiling per model when embedding on the CPU
pub fn default_cpu_chunk_cap() -> usize {
    100
}

/// Minimum free accelerator memory (MB) required to use it
pub fn default_min_free_memory_mb() -> u64 {
    2048
}

/// Default refiner service URL
pub fn default_refiner_url() -> String {
    std::env::var("ARCHIVIST_REFINER_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8091/refine".to_string())
}

/// Default refiner request timeout in seconds
pub fn default_refiner_timeout_secs() -> u64 {
    120
}

/// Default target language for the quality gate
pub fn default_target_language() -> String {
    "en".to_string()
}

/// Minimum characters of real content before foreign-language output is trusted
pub fn default_quality_min_chars() -> usize {
    30
}

/// Template phrases that mark degenerate refinement output
pub fn default_template_phrases() -> Vec<String> {
    vec![
        "certainly, here is".to_string(),
        "here is the reformatted text".to_string(),
        "here is the corrected text".to_string(),
        "as an ai language model".to_string(),
        "i'm sorry, but".to_string(),
    ]
}

/// Default worker pool size for ingestion
pub fn default_pool_size() -> usize {
    4
}

/// Default maximum file size accepted for ingestion (bytes)
pub fn default_max_file_bytes() -> u64 {
    100 * 1024 * 1024
}

/// Default OCR timeout in seconds
pub fn default_ocr_timeout_secs() -> u64 {
    300
}

/// Default OCR retry count
pub fn default_ocr_max_retries() -> u32 {
    2
}
