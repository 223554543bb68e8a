//! 面向用户的本地化文案（西班牙语）

// 通用
pub const CONNECTION_ERROR: &str = "Error de conexión";
pub const SERVER_CONNECTION_ERROR: &str = "Error de conexión con el servidor";
pub const ALL_FIELDS_REQUIRED: &str = "Todos los campos son obligatorios";
pub const PASSWORDS_DO_NOT_MATCH: &str = "Las contraseñas no coinciden";
pub const PASSWORD_TOO_SHORT: &str = "La contraseña debe tener al menos 6 caracteres";
pub const INVALID_EMAIL: &str = "Correo electrónico inválido";
pub const PAGE_SIZE_INVALID: &str = "Tamaño de página no permitido";

// 认证
pub const LOGIN_FAILED: &str = "Credenciales incorrectas";
pub const REGISTER_FAILED: &str = "Error al registrar usuario";
pub const REGISTER_SUCCEEDED: &str = "Registro exitoso. Por favor, inicia sesión.";

// 仪表盘
pub const SUMMARY_LOAD_FAILED: &str = "Error al cargar el dashboard";

// 患者
pub const PATIENTS_LOAD_FAILED: &str = "Error al cargar pacientes";
pub const PATIENT_SAVE_FAILED: &str = "Error al guardar paciente";
pub const PATIENT_DELETE_FAILED: &str = "Error al eliminar paciente";
pub const PATIENT_NAME_AND_AGE_REQUIRED: &str = "Nombre y edad son obligatorios";
pub const PATIENT_AGE_OUT_OF_RANGE: &str = "La edad debe estar entre 0 y 150";
pub const CONFIRM_PATIENT_DELETE: &str = "¿Está seguro de eliminar este paciente?";

// 诊断
pub const DIAGNOSES_LOAD_FAILED: &str = "Error al cargar diagnósticos";
pub const DIAGNOSIS_SUBMIT_FAILED: &str = "Error al procesar diagnóstico";
pub const INVALID_IMAGE: &str = "Por favor selecciona una imagen válida";
pub const PATIENT_AND_IMAGE_REQUIRED: &str = "Debe seleccionar un paciente y una imagen";
pub const INTERPRETATION_POSITIVE: &str = "El paciente presenta signos compatibles con COVID-19.";
pub const INTERPRETATION_NEGATIVE: &str = "El paciente no presenta signos de COVID-19.";

// 个人资料
pub const PROFILE_LOAD_FAILED: &str = "Error al cargar perfil";
pub const PROFILE_UPDATE_FAILED: &str = "Error al actualizar perfil";
pub const PROFILE_DELETE_FAILED: &str = "Error al eliminar cuenta";
pub const PROFILE_NAME_AND_EMAIL_REQUIRED: &str = "Nombre y correo son obligatorios";
pub const PROFILE_UPDATED: &str = "Perfil actualizado correctamente";
pub const ACCOUNT_DELETED: &str = "Cuenta eliminada correctamente";
pub const CONFIRM_ACCOUNT_DELETE: &str =
    "¿Está seguro de eliminar su cuenta? Esta acción no se puede deshacer.";
