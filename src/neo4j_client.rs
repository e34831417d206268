use anyhow::Result;
use neo4rs::{query, Graph};
use tracing::info;
use url::Url;

pub const CHUNK_VECTOR_INDEX: &str = "cvChunkEmbeddingIndex";

pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Graph> {
    let url = Url::parse(uri)?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("Conectando a Neo4j en {addr}...");
    let graph = Graph::new(&addr, user, password).await?;
    info!("Conexión a Neo4j OK");
    Ok(graph)
}

/// Crea la constraint de unicidad de `:CvChunk(id, namespace)` y el índice vectorial
/// sobre `:CvChunk(embedding)` si todavía no existen.
pub async fn ensure_schema(graph: &Graph, dimension: usize) -> Result<()> {
    graph
        .run(query(
            "CREATE CONSTRAINT cv_chunk_id IF NOT EXISTS
             FOR (c:CvChunk)
             REQUIRE (c.id, c.namespace) IS UNIQUE",
        ))
        .await?;
    graph
        .run(query(
            "CREATE INDEX cv_chunk_namespace IF NOT EXISTS
             FOR (c:CvChunk) ON (c.namespace)",
        ))
        .await?;

    let mut cursor = graph
        .execute(
            query("SHOW VECTOR INDEXES YIELD name WHERE name = $name RETURN name")
                .param("name", CHUNK_VECTOR_INDEX),
        )
        .await?;

    if cursor.next().await?.is_some() {
        info!("Índice vectorial '{CHUNK_VECTOR_INDEX}' ya existe.");
        return Ok(());
    }

    let cypher = format!(
        "\
CREATE VECTOR INDEX {CHUNK_VECTOR_INDEX}
FOR (c:CvChunk)
ON (c.embedding)
OPTIONS {{
  indexConfig: {{
    `vector.dimensions`: {dimension},
    `vector.similarity_function`: 'cosine'
  }}
}}"
    );
    graph.run(query(&cypher)).await?;
    info!("Índice vectorial '{CHUNK_VECTOR_INDEX}' creado ({dimension} dimensiones).");

    Ok(())
}
