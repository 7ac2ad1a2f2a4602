//! Typed calls against the warehouse REST API.
//!
//! Thin wrappers over [`SessionClient`]: every call inherits bearer
//! attachment and refresh-on-401. Resource shapes mirror the backend
//! serializers; unknown fields are ignored so backend additions do not
//! break the client.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::SessionClient;
use crate::error::SessionError;
use crate::state::UserProfile;
use crate::transport::ApiRequest;

/// Reason recorded when a stock-out is registered without one.
pub const DEFAULT_MOTIVO: &str = "Sin motivo especificado";

/// A product row. The backend nests the full category object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producto {
    pub id: i64,
    pub nombre: String,
    pub stock: i64,
    #[serde(default)]
    pub unidad_medida: Option<String>,
    #[serde(default)]
    pub estado: Option<String>,
    #[serde(default)]
    pub descripcion: Option<String>,
    #[serde(default)]
    pub categoria: Option<Categoria>,
    #[serde(default)]
    pub fecha_creacion: Option<String>,
    #[serde(default)]
    pub fecha_actualizacion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Categoria {
    pub id: i64,
    pub nombre: String,
    #[serde(default)]
    pub descripcion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Noticia {
    pub id: i64,
    pub titulo: String,
    pub contenido: String,
    #[serde(default)]
    pub fecha_creacion: Option<String>,
}

/// Body of `POST /salidas/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NuevaSalida {
    pub producto: i64,
    pub cantidad: i64,
    pub entregado_a: String,
    pub motivo: String,
    /// RFC 3339 timestamp; the backend stamps "now" when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_hora: Option<String>,
}

/// A registered stock-out as returned by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SalidaProducto {
    #[serde(default)]
    pub id: Option<i64>,
    pub producto: i64,
    #[serde(default)]
    pub producto_detail: Option<Producto>,
    pub cantidad: i64,
    pub entregado_a: String,
    pub motivo: String,
    #[serde(default)]
    pub fecha_hora: Option<String>,
    #[serde(default)]
    pub usuario_nombre: Option<String>,
}

/// Body of `POST /ingresos/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NuevoIngreso {
    pub producto: i64,
    pub cantidad: i64,
    /// `YYYY-MM-DD HH:MM:SS`; the backend stamps "now" when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha: Option<String>,
}

/// A stock entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngresoProducto {
    pub id: i64,
    pub producto: i64,
    #[serde(default)]
    pub producto_detail: Option<Producto>,
    pub cantidad: i64,
    #[serde(default)]
    pub fecha: Option<String>,
    #[serde(default)]
    pub usuario: Option<i64>,
    #[serde(default)]
    pub usuario_nombre: Option<String>,
}

/// One movement in a product's history (entry or stock-out).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorialProducto {
    pub id: i64,
    pub producto: i64,
    #[serde(default)]
    pub producto_nombre: Option<String>,
    pub cantidad: i64,
    pub tipo_movimiento: String,
    #[serde(default)]
    pub fecha: Option<String>,
    #[serde(default)]
    pub usuario_nombre: Option<String>,
    #[serde(default)]
    pub entregado_a: Option<String>,
    #[serde(default)]
    pub motivo: Option<String>,
    #[serde(default)]
    pub unidad_medida: Option<String>,
}

/// A worker in the personnel registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Personal {
    pub id: i64,
    pub nombres: String,
    pub apellidos: String,
    pub dni: String,
    pub cargo: String,
    #[serde(default)]
    pub telefono: Option<String>,
    #[serde(default)]
    pub procedencia: Option<String>,
    #[serde(default)]
    pub banco: Option<String>,
    #[serde(default)]
    pub numero_cuenta: Option<String>,
    #[serde(default)]
    pub numero_cci: Option<String>,
}

impl Personal {
    #[must_use]
    pub fn nombre_completo(&self) -> String {
        format!("{} {}", self.nombres, self.apellidos)
    }
}

/// Check a stock-out against the product before it is sent.
///
/// # Errors
///
/// Returns [`SessionError::Validation`] for a non-positive quantity, a
/// quantity above the current stock, or an empty recipient.
pub fn validate_salida(
    producto: &Producto,
    cantidad: i64,
    entregado_a: &str,
    motivo: &str,
) -> Result<NuevaSalida, SessionError> {
    if cantidad <= 0 {
        return Err(SessionError::Validation("quantity must be greater than zero".into()));
    }
    if cantidad > producto.stock {
        return Err(SessionError::Validation(format!(
            "not enough stock for {}: requested {cantidad}, available {}",
            producto.nombre, producto.stock
        )));
    }
    let entregado_a = entregado_a.trim();
    if entregado_a.is_empty() {
        return Err(SessionError::Validation("recipient (entregado_a) is required".into()));
    }
    let motivo = match motivo.trim() {
        "" => DEFAULT_MOTIVO,
        m => m,
    };

    Ok(NuevaSalida {
        producto: producto.id,
        cantidad,
        entregado_a: entregado_a.to_string(),
        motivo: motivo.to_string(),
        fecha_hora: None,
    })
}

/// Check a stock entry before it is sent.
///
/// # Errors
///
/// Returns [`SessionError::Validation`] for a non-positive quantity or a
/// timestamp that is not `YYYY-MM-DD HH:MM:SS`.
pub fn validate_ingreso(producto: i64, cantidad: i64, fecha: Option<&str>) -> Result<NuevoIngreso, SessionError> {
    if cantidad <= 0 {
        return Err(SessionError::Validation("quantity must be greater than zero".into()));
    }
    let fecha = fecha.map(str::trim).filter(|f| !f.is_empty());
    if let Some(fecha) = fecha {
        if !is_timestamp(fecha) {
            return Err(SessionError::Validation(format!(
                "invalid entry timestamp {fecha:?}, expected YYYY-MM-DD HH:MM:SS"
            )));
        }
    }
    Ok(NuevoIngreso { producto, cantidad, fecha: fecha.map(ToOwned::to_owned) })
}

/// `YYYY-MM-DD`, digits in place.
fn is_date(value: &str) -> bool {
    value.len() == 10
        && value.char_indices().all(|(i, c)| match i {
            4 | 7 => c == '-',
            _ => c.is_ascii_digit(),
        })
}

/// `YYYY-MM-DD HH:MM:SS`, digits in place.
fn is_timestamp(value: &str) -> bool {
    let Some((date, time)) = value.split_once(' ') else {
        return false;
    };
    is_date(date)
        && time.len() == 8
        && time.char_indices().all(|(i, c)| match i {
            2 | 5 => c == ':',
            _ => c.is_ascii_digit(),
        })
}

/// Decode a list endpoint that may or may not be paginated.
fn decode_list<T: DeserializeOwned>(value: Value) -> Result<Vec<T>, SessionError> {
    let items = match value {
        Value::Object(mut map) if map.contains_key("results") => map.remove("results").unwrap_or_default(),
        other => other,
    };
    serde_json::from_value(items).map_err(|e| SessionError::Decode(e.to_string()))
}

pub struct AlmacenApi<'a> {
    client: &'a SessionClient,
}

impl<'a> AlmacenApi<'a> {
    #[must_use]
    pub fn new(client: &'a SessionClient) -> Self {
        Self { client }
    }

    pub async fn health(&self) -> Result<Value, SessionError> {
        self.client.get_json("health/").await
    }

    pub async fn current_user(&self) -> Result<UserProfile, SessionError> {
        self.client.fetch_current_user().await
    }

    pub async fn list_productos(&self) -> Result<Vec<Producto>, SessionError> {
        decode_list(self.client.get_json("productos/").await?)
    }

    pub async fn get_producto(&self, id: i64) -> Result<Producto, SessionError> {
        self.client.get_json(&format!("productos/{id}/")).await
    }

    pub async fn list_categorias(&self) -> Result<Vec<Categoria>, SessionError> {
        decode_list(self.client.get_json("categorias/").await?)
    }

    pub async fn create_categoria(&self, nombre: &str) -> Result<Categoria, SessionError> {
        let nombre = nombre.trim();
        if nombre.is_empty() {
            return Err(SessionError::Validation("category name is required".into()));
        }
        self.client
            .post_json("categorias/", serde_json::json!({ "nombre": nombre }))
            .await
    }

    /// Movements of one product, or of every product when `producto` is `None`.
    pub async fn historial_producto(&self, producto: Option<i64>) -> Result<Vec<HistorialProducto>, SessionError> {
        let mut request = ApiRequest::get("historial-producto/");
        if let Some(id) = producto {
            request = request.with_query("producto", id.to_string());
        }
        decode_list(self.client.send_json(request).await?)
    }

    pub async fn list_ingresos(&self) -> Result<Vec<IngresoProducto>, SessionError> {
        decode_list(self.client.get_json("ingresos/").await?)
    }

    /// Entries registered on `fecha` (`YYYY-MM-DD`), today when `None`.
    pub async fn ingresos_del_dia(&self, fecha: Option<&str>) -> Result<Vec<IngresoProducto>, SessionError> {
        let mut request = ApiRequest::get("ingresos-dia/");
        if let Some(fecha) = fecha {
            if !is_date(fecha) {
                return Err(SessionError::Validation(format!("invalid date {fecha:?}, expected YYYY-MM-DD")));
            }
            request = request.with_query("fecha", fecha);
        }
        decode_list(self.client.send_json(request).await?)
    }

    /// Register a stock entry. Nothing is posted when validation fails.
    pub async fn registrar_ingreso(
        &self,
        producto: i64,
        cantidad: i64,
        fecha: Option<&str>,
    ) -> Result<IngresoProducto, SessionError> {
        let ingreso = validate_ingreso(producto, cantidad, fecha)?;
        let body = serde_json::to_value(&ingreso).map_err(|e| SessionError::Decode(e.to_string()))?;

        let created: IngresoProducto = self.client.send_json(ApiRequest::post("ingresos/", body)).await?;
        tracing::info!(producto, cantidad = created.cantidad, "stock entry registered");
        Ok(created)
    }

    pub async fn list_personal(&self) -> Result<Vec<Personal>, SessionError> {
        decode_list(self.client.get_json("personal/").await?)
    }

    /// Personnel whose name, surname or DNI matches `texto`.
    pub async fn buscar_personal(&self, texto: &str) -> Result<Vec<Personal>, SessionError> {
        let texto = texto.trim();
        if texto.is_empty() {
            return Ok(Vec::new());
        }
        let request = ApiRequest::get("buscar-personal/").with_query("search", texto);
        decode_list(self.client.send_json(request).await?)
    }

    /// Attendance records; their shape belongs to the backend.
    pub async fn list_tareos(&self) -> Result<Vec<Value>, SessionError> {
        decode_list(self.client.get_json("tareos/").await?)
    }

    pub async fn list_noticias(&self) -> Result<Vec<Noticia>, SessionError> {
        decode_list(self.client.get_json("noticias/").await?)
    }

    /// Aggregated dashboard payload; its shape belongs to the backend.
    pub async fn dashboard_data(&self) -> Result<Value, SessionError> {
        self.client.get_json("dashboard-data/").await
    }

    /// Register a stock-out after checking it against the product's current
    /// stock. Nothing is posted when validation fails.
    pub async fn registrar_salida(
        &self,
        producto_id: i64,
        cantidad: i64,
        entregado_a: &str,
        motivo: &str,
    ) -> Result<SalidaProducto, SessionError> {
        let producto = self.get_producto(producto_id).await?;
        let salida = validate_salida(&producto, cantidad, entregado_a, motivo)?;
        let body = serde_json::to_value(&salida).map_err(|e| SessionError::Decode(e.to_string()))?;

        let created: SalidaProducto = self.client.send_json(ApiRequest::post("salidas/", body)).await?;
        tracing::info!(
            producto = producto.id,
            cantidad = created.cantidad,
            entregado_a = %created.entregado_a,
            "stock-out registered"
        );
        Ok(created)
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
