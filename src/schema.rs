//! The verdict contract: the exact shape of a valid audit result.
//!
//! [`VerdictSchema`] plays two roles. It is sent to the backend as a strict
//! output constraint (JSON Schema, `additionalProperties: false`, all nine
//! fields required, verdicts limited to four literals), and it validates
//! whatever comes back. A reply that is missing a field, has a wrong type or
//! an out-of-enum verdict is rejected; nothing is coerced or defaulted.

use crate::error::AuditError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Compliance outcome for one contact scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "APTO")]
    Apto,
    #[serde(rename = "APTO_CONDICIONADO")]
    AptoCondicionado,
    #[serde(rename = "NO_APTO")]
    NoApto,
    #[serde(rename = "NO_APLICA")]
    NoAplica,
}

impl Verdict {
    pub const ALL: [Verdict; 4] = [
        Verdict::Apto,
        Verdict::AptoCondicionado,
        Verdict::NoApto,
        Verdict::NoAplica,
    ];

    /// Literal used on the wire and in the schema enum.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Verdict::Apto => "APTO",
            Verdict::AptoCondicionado => "APTO_CONDICIONADO",
            Verdict::NoApto => "NO_APTO",
            Verdict::NoAplica => "NO_APLICA",
        }
    }

    /// Human-readable form ("APTO CONDICIONADO").
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A schema-valid audit result.
///
/// The two verdicts are independent: any combination is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuditReport {
    pub material_classification: String,
    pub recommended_family: String,
    pub direct_contact_verdict: Verdict,
    pub indirect_contact_verdict: Verdict,
    pub technical_justification: String,
    pub detected_risks: Vec<String>,
    pub missing_documentation: Vec<String>,
    pub recommendations: Vec<String>,
    pub final_conclusion: String,
}

impl AuditReport {
    /// Render the report as a Markdown summary.
    pub fn to_markdown(&self, material: Option<&str>) -> String {
        let mut md = String::new();
        md.push_str("# Informe técnico de aptitud alimentaria\n\n");
        if let Some(m) = material {
            md.push_str(&format!("**Referencia:** {}\n\n", m));
        }
        md.push_str("## 1. Identificación del material\n\n");
        md.push_str(&format!("- **Clasificación:** {}\n", self.material_classification));
        md.push_str(&format!("- **Familia recomendada:** {}\n\n", self.recommended_family));

        md.push_str("## 2. Veredictos\n\n");
        md.push_str("| Escenario | Veredicto |\n|:---|:---:|\n");
        md.push_str(&format!("| Contacto directo | {} |\n", self.direct_contact_verdict));
        md.push_str(&format!("| Contacto indirecto | {} |\n\n", self.indirect_contact_verdict));

        md.push_str("## 3. Justificación técnica\n\n");
        md.push_str(self.technical_justification.trim());
        md.push_str("\n\n");

        push_list(&mut md, "4. Riesgos detectados", &self.detected_risks);
        push_list(&mut md, "5. Documentación faltante", &self.missing_documentation);
        push_list(&mut md, "6. Recomendaciones", &self.recommendations);

        md.push_str("## 7. Conclusión\n\n");
        md.push_str(self.final_conclusion.trim());
        md.push('\n');
        md
    }
}

fn push_list(md: &mut String, title: &str, items: &[String]) {
    md.push_str(&format!("## {}\n\n", title));
    if items.is_empty() {
        md.push_str("- Ninguno\n");
    }
    for item in items {
        md.push_str(&format!("- {}\n", item.trim()));
    }
    md.push('\n');
}

// ── Schema ───────────────────────────────────────────────────────────────

const STRING_FIELDS: [(&str, &str); 4] = [
    (
        "materialClassification",
        "Resumen breve del tipo de material detectado.",
    ),
    (
        "recommendedFamily",
        "Familia industrial recomendada (Ej: Tornillería, Transmisiones, Neumática, Juntas, EPP, Lubricantes).",
    ),
    (
        "technicalJustification",
        "Justificación técnica basada en reglamentos explicando por qué se aprueba o rechaza cada tipo de contacto.",
    ),
    (
        "finalConclusion",
        "Conclusión profesional. Debe indicar explícitamente si se autoriza la compra y bajo qué condiciones de uso (Directo vs Indirecto).",
    ),
];

const VERDICT_FIELDS: [(&str, &str); 2] = [
    (
        "directContactVerdict",
        "Veredicto estricto para contacto DIRECTO con alimento.",
    ),
    (
        "indirectContactVerdict",
        "Veredicto estricto para contacto INDIRECTO (accidental, entorno, encima de línea).",
    ),
];

const LIST_FIELDS: [(&str, &str); 3] = [
    ("detectedRisks", "Lista de riesgos reales detectados."),
    (
        "missingDocumentation",
        "Documentación necesaria que no se ha encontrado.",
    ),
    ("recommendations", "Acciones recomendadas sensatas."),
];

/// Field names of [`AuditReport`], in declaration order.
pub const REQUIRED_FIELDS: [&str; 9] = [
    "materialClassification",
    "recommendedFamily",
    "directContactVerdict",
    "indirectContactVerdict",
    "technicalJustification",
    "detectedRisks",
    "missingDocumentation",
    "recommendations",
    "finalConclusion",
];

/// The formal contract for [`AuditReport`].
#[derive(Debug, Clone, PartialEq)]
pub struct VerdictSchema {
    name: &'static str,
    schema: Value,
}

impl Default for VerdictSchema {
    fn default() -> Self {
        Self::audit_report()
    }
}

impl VerdictSchema {
    /// The food-contact audit report schema.
    pub fn audit_report() -> Self {
        let mut properties = Map::new();

        for (field, description) in STRING_FIELDS {
            properties.insert(
                field.to_string(),
                json!({ "type": "string", "description": description }),
            );
        }
        let verdicts: Vec<&str> = Verdict::ALL.iter().map(Verdict::as_str).collect();
        for (field, description) in VERDICT_FIELDS {
            properties.insert(
                field.to_string(),
                json!({ "type": "string", "enum": &verdicts, "description": description }),
            );
        }
        for (field, description) in LIST_FIELDS {
            properties.insert(
                field.to_string(),
                json!({
                    "type": "array",
                    "items": { "type": "string" },
                    "description": description
                }),
            );
        }

        Self {
            name: "food_contact_audit_report",
            schema: json!({
                "type": "object",
                "properties": Value::Object(properties),
                "required": REQUIRED_FIELDS,
                "additionalProperties": false
            }),
        }
    }

    /// Schema identifier sent alongside the constraint.
    pub fn name(&self) -> &str {
        self.name
    }

    /// The JSON Schema document.
    pub fn as_json(&self) -> &Value {
        &self.schema
    }

    /// Parse a raw JSON string and validate it against the schema.
    pub fn parse(&self, raw: &str) -> Result<AuditReport, AuditError> {
        let value: Value = serde_json::from_str(raw).map_err(|e| AuditError::SchemaViolation {
            detail: format!("response is not valid JSON: {}", e),
        })?;
        self.validate(value)
    }

    /// Validate a parsed value, collecting every structural problem.
    ///
    /// The partially valid value is dropped on failure; callers only ever see
    /// a complete [`AuditReport`].
    pub fn validate(&self, value: Value) -> Result<AuditReport, AuditError> {
        let problems = self.structural_problems(&value);
        if !problems.is_empty() {
            return Err(AuditError::SchemaViolation {
                detail: problems.join("; "),
            });
        }

        serde_json::from_value(value).map_err(|e| AuditError::SchemaViolation {
            detail: e.to_string(),
        })
    }

    fn structural_problems(&self, value: &Value) -> Vec<String> {
        let Some(obj) = value.as_object() else {
            return vec![format!("expected a JSON object, got {}", json_type(value))];
        };

        let mut problems = Vec::new();

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|f| !obj.contains_key(*f))
            .collect();
        if !missing.is_empty() {
            problems.push(format!("missing field(s): {}", missing.join(", ")));
        }

        let mut unknown: Vec<&str> = obj
            .keys()
            .map(String::as_str)
            .filter(|k| !REQUIRED_FIELDS.contains(k))
            .collect();
        unknown.sort_unstable();
        if !unknown.is_empty() {
            problems.push(format!("unexpected field(s): {}", unknown.join(", ")));
        }

        for (field, _) in STRING_FIELDS {
            if let Some(v) = obj.get(field) {
                if !v.is_string() {
                    problems.push(format!("{} must be a string, got {}", field, json_type(v)));
                }
            }
        }

        for (field, _) in VERDICT_FIELDS {
            match obj.get(field) {
                Some(Value::String(s)) if Verdict::ALL.iter().any(|v| v.as_str() == s.as_str()) => {}
                Some(Value::String(s)) => problems.push(format!(
                    "{} has out-of-enum value '{}' (expected one of APTO, APTO_CONDICIONADO, NO_APTO, NO_APLICA)",
                    field, s
                )),
                Some(v) => problems.push(format!("{} must be a string, got {}", field, json_type(v))),
                None => {}
            }
        }

        for (field, _) in LIST_FIELDS {
            match obj.get(field) {
                Some(Value::Array(items)) => {
                    if let Some(pos) = items.iter().position(|i| !i.is_string()) {
                        problems.push(format!("{}[{}] must be a string", field, pos));
                    }
                }
                Some(v) => problems.push(format!("{} must be an array, got {}", field, json_type(v))),
                None => {}
            }
        }

        problems
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
