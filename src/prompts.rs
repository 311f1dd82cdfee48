//! Prompt text for the food-contact audit.
//!
//! Every string the model reads lives here: the fixed auditor persona, the
//! leading request segment, per-page provenance markers and the advisories
//! substituted for evidence that could not be visualised. Tests inspect these
//! directly without a backend.

use crate::context::AuditContext;

/// Fixed system instruction: auditor persona, notional date and location,
/// and the two-axis verdict taxonomy.
pub const SYSTEM_INSTRUCTION: &str = r#"Eres **IndustrIA**, un auditor técnico senior especializado en ingeniería de materiales y seguridad alimentaria.
Estás ubicado en **Murcia, España**.
La fecha actual es **4 de Diciembre de 2025**.

**TU MISIÓN:**
Evaluar materiales industriales y determinar claramente su aptitud para dos escenarios distintos:
1. **CONTACTO DIRECTO:** El material toca físicamente el alimento.
2. **CONTACTO INDIRECTO:** El material está en el entorno, encima de líneas abiertas, o hay riesgo de contacto accidental.

**CRITERIOS DE AUDITORÍA:**
- Analiza Fichas Técnicas y Certificados.
- **DIRECTO:** Requiere cumplimiento estricto Reg. 1935/2004, Reg. 10/2011 (plásticos), FDA, migración global/específica declarada.
- **INDIRECTO:** Puede ser apto si cumple criterios de higiene general, ausencia de sustancias tóxicas volátiles, lubricantes H1, etc., aunque no tenga migración específica.
- **NO APTO:** Materiales sucios, oxidables, madera (salvo excepciones), vidrio no protegido, materiales sin trazabilidad.

**RESULTADOS POSIBLES (usa exactamente estos literales):**
- **APTO:** Cumple normativa sobradamente.
- **APTO_CONDICIONADO:** Cumple pero falta algún documento menor (ej: renovar DoC antigua) o requiere limpieza previa.
- **NO_APTO:** Riesgo de seguridad alimentaria.
- **NO_APLICA:** Para materiales que no tienen sentido en esa categoría (ej: un rodamiento interno sellado podría ser NO_APLICA para directo, pero APTO para indirecto).

**IMPORTANTE:**
- Los dos veredictos son independientes: nunca los fusiones en uno solo.
- Si un material es para uso estructural lejos de la línea, será NO_APTO (o NO_APLICA) para directo, y APTO para indirecto/sin contacto.
- Clasifica la familia correctamente.
- Responde únicamente con el objeto JSON solicitado.

**TONO:**
Profesional, técnico, riguroso."#;

/// Appended to the system instruction for backends that cannot enforce a
/// response schema natively.
pub fn schema_instruction(schema_json: &str) -> String {
    format!(
        "\n\n**FORMATO DE RESPUESTA:**\nDevuelve un único objeto JSON, sin texto adicional ni bloques de código, \
         que cumpla exactamente este JSON Schema (todos los campos obligatorios, sin campos extra):\n{}",
        schema_json
    )
}

/// Leading text segment of every audit request.
pub fn request_text(context: &AuditContext) -> String {
    let material = context
        .material()
        .unwrap_or("No especificado (Detectar del archivo)");
    let usage = match context.intended_use.trim() {
        "" => "No especificado (inferir del contexto)",
        u => u,
    };
    let notes = match context.technical_data.trim() {
        "" => "Sin notas",
        n => n,
    };

    format!(
        "SOLICITUD DE AUDITORÍA TÉCNICA - INDUSTRIA.\n\n\
         Item/Material: {material}\n\
         Uso declarado: {usage}\n\n\
         NOTAS DEL USUARIO:\n\"{notes}\"\n\n\
         Analiza la documentación adjunta (si existe) y los datos proporcionados.\n\
         Genera el dictamen diferenciado para Contacto Directo e Indirecto."
    )
}

/// Provenance marker placed before each rasterised PDF page.
pub fn page_marker(page: usize, attachment: usize, name: &str) -> String {
    format!("Página {page} del documento adjunto {attachment} ({name}):")
}

/// Advisory used when a PDF yields no pages.
pub fn unreadable_pdf_advisory(attachment: usize, name: &str) -> String {
    format!(
        "[AVISO] El documento adjunto {attachment} ({name}) es un PDF que no pudo visualizarse \
         (dañado, cifrado o no soportado). Evalúa con el resto de la información disponible \
         y considéralo documentación no aportada."
    )
}

/// Advisory used when an image attachment cannot be forwarded.
pub fn unreadable_image_advisory(attachment: usize, name: &str) -> String {
    format!(
        "[AVISO] La imagen adjunta {attachment} ({name}) no pudo procesarse y no se incluye en la solicitud."
    )
}

/// Advisory used when an unsupported attachment slipped past the codec.
pub fn unsupported_attachment_advisory(attachment: usize, name: &str, mime_type: &str) -> String {
    format!(
        "[AVISO] El adjunto {attachment} ({name}) tiene un formato no soportado ({mime_type}) y se ha omitido."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_instruction_lists_every_verdict_literal() {
        for literal in ["APTO", "APTO_CONDICIONADO", "NO_APTO", "NO_APLICA"] {
            assert!(SYSTEM_INSTRUCTION.contains(literal), "missing {literal}");
        }
        assert!(SYSTEM_INSTRUCTION.contains("CONTACTO DIRECTO"));
        assert!(SYSTEM_INSTRUCTION.contains("CONTACTO INDIRECTO"));
    }

    #[test]
    fn request_text_uses_defaults_when_fields_are_blank() {
        let text = request_text(&AuditContext::new().technical_data("Ficha adjunta"));
        assert!(text.contains("No especificado (Detectar del archivo)"));
        assert!(text.contains("No especificado (inferir del contexto)"));
        assert!(text.contains("\"Ficha adjunta\""));
    }

    #[test]
    fn request_text_carries_user_fields() {
        let ctx = AuditContext::new()
            .material_name("Banda modular POM")
            .intended_use("Transporte de producto envasado");
        let text = request_text(&ctx);
        assert!(text.contains("Item/Material: Banda modular POM"));
        assert!(text.contains("Uso declarado: Transporte de producto envasado"));
        assert!(text.contains("Sin notas"));
    }

    #[test]
    fn page_marker_names_page_and_attachment() {
        assert_eq!(
            page_marker(2, 1, "ficha.pdf"),
            "Página 2 del documento adjunto 1 (ficha.pdf):"
        );
    }
}
