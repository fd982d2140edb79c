//! Role to permission table.
//!
//! The table is static data: it is defined once, never mutated, and every
//! lookup on an unknown role or permission name answers `false` (or an
//! empty set) instead of failing. Role strings stored on accounts are free
//! text, so anything not listed here simply has no permissions.

use std::collections::BTreeSet;
use std::fmt;

/// A named capability checked by the surrounding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    ManageUsers,
    ManageTeachers,
    ManageStudents,
    TakeAttendance,
    ViewReports,
    ExportData,
    ManageSystemConfig,
    BackupRestore,
    ViewAuditLog,
}

impl Permission {
    pub const ALL: [Permission; 9] = [
        Self::ManageUsers,
        Self::ManageTeachers,
        Self::ManageStudents,
        Self::TakeAttendance,
        Self::ViewReports,
        Self::ExportData,
        Self::ManageSystemConfig,
        Self::BackupRestore,
        Self::ViewAuditLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManageUsers => "manage_users",
            Self::ManageTeachers => "manage_teachers",
            Self::ManageStudents => "manage_students",
            Self::TakeAttendance => "take_attendance",
            Self::ViewReports => "view_reports",
            Self::ExportData => "export_data",
            Self::ManageSystemConfig => "manage_system_config",
            Self::BackupRestore => "backup_restore",
            Self::ViewAuditLog => "view_audit_log",
        }
    }

    /// Parse a permission name. Also accepts the keys used by older
    /// deployments (`gestion_docentes`, `manage_docentes`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        let perm = match name {
            "manage_users" | "manage_usuarios" | "gestion_usuarios" => Self::ManageUsers,
            "manage_teachers" | "manage_docentes" | "gestion_docentes" => Self::ManageTeachers,
            "manage_students" | "manage_estudiantes" | "gestion_estudiantes" => {
                Self::ManageStudents
            }
            "take_attendance" | "control_asistencia" => Self::TakeAttendance,
            "view_reports" | "ver_reportes" => Self::ViewReports,
            "export_data" | "exportar_datos" => Self::ExportData,
            "manage_system_config" | "configuracion_sistema" => Self::ManageSystemConfig,
            "backup_restore" => Self::BackupRestore,
            "view_audit_log" | "auditoria" => Self::ViewAuditLog,
            _ => return None,
        };
        Some(perm)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known roles, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Administrator,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Administrator => "Administrator",
            Self::Teacher => "Teacher",
            Self::Student => "Student",
        }
    }

    /// Parse a stored role string. Spanish names written by older
    /// deployments map to the same roles.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Administrator" | "Administrador" => Some(Self::Administrator),
            "Teacher" | "Docente" => Some(Self::Teacher),
            "Student" | "Estudiante" => Some(Self::Student),
            _ => None,
        }
    }

    pub fn permissions(&self) -> &'static [Permission] {
        TABLE
            .iter()
            .find(|(role, _)| role == self)
            .map(|(_, perms)| *perms)
            .unwrap_or(&[])
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static TABLE: &[(Role, &[Permission])] = &[
    (Role::Administrator, &Permission::ALL),
    (
        Role::Teacher,
        &[
            Permission::TakeAttendance,
            Permission::ViewReports,
            Permission::ExportData,
        ],
    ),
    (Role::Student, &[]),
];

static ROLE_NAMES: &[&str] = &["Administrator", "Teacher", "Student"];

/// Does `role` have `permission`? Unknown names answer `false`.
pub fn has_permission(role: &str, permission: &str) -> bool {
    match Permission::parse(permission) {
        Some(perm) => role_has(role, perm),
        None => false,
    }
}

/// Typed variant of [`has_permission`].
pub fn role_has(role: &str, permission: Permission) -> bool {
    Role::parse(role).is_some_and(|r| r.permissions().contains(&permission))
}

/// Full permission set of `role`; empty for an unknown role.
pub fn permissions_for(role: &str) -> BTreeSet<Permission> {
    Role::parse(role)
        .map(|r| r.permissions().iter().copied().collect())
        .unwrap_or_default()
}

/// Role names for pickers, in table order.
pub fn known_roles() -> &'static [&'static str] {
    ROLE_NAMES
}
