#[cfg(test)]
mod tests {
    use crate::db::{
        find_student_by_reg, list_arrears_for_reg, list_attendance_for_reg, list_students,
        list_subjects,
    };
    use crate::error::AppError;
    use crate::import::{ImportRow, ImportType, run_import};
    use crate::test::utils::TestDbBuilder;
    use rocket::tokio;
    use serde_json::json;

    fn row(value: serde_json::Value) -> ImportRow {
        value.as_object().expect("row must be an object").clone()
    }

    #[tokio::test]
    async fn test_student_import_creates_with_defaults() {
        let test_db = TestDbBuilder::new().build().await.expect("build failed");

        let rows = vec![row(json!({
            "Name": "A",
            "Reg no": "R1",
            "Email": "a@x.com",
            "Dep": "CS",
            "Sem": 3
        }))];

        let summary = run_import(&test_db.pool, ImportType::StudentList, &rows)
            .await
            .expect("import failed");

        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 0);

        let student = find_student_by_reg(&test_db.pool, "R1")
            .await
            .expect("query failed")
            .expect("student missing");

        assert_eq!(student.name, "A");
        assert_eq!(student.email, "a@x.com");
        assert_eq!(student.department, "CS");
        assert_eq!(student.semester, 3);
        assert_eq!(student.attendance, 0.0);
        assert!(!student.fees_paid);
        assert!(student.arrears.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_student_rows_are_skipped() {
        let test_db = TestDbBuilder::new().build().await.expect("build failed");

        let first = vec![row(json!({
            "Name": "A",
            "Reg no": "R1",
            "Email": "a@x.com",
            "Dep": "CS",
            "Sem": 3
        }))];
        run_import(&test_db.pool, ImportType::StudentList, &first)
            .await
            .expect("import failed");

        // Same registration number under a new email, and same email under
        // a new registration number: both must be skipped, never merged.
        let duplicates = vec![
            row(json!({
                "Name": "A2",
                "Reg no": "R1",
                "Email": "other@x.com",
                "Dep": "CS",
                "Sem": 3
            })),
            row(json!({
                "Name": "A3",
                "Reg no": "R9",
                "Email": "a@x.com",
                "Dep": "CS",
                "Sem": 3
            })),
        ];

        let summary = run_import(&test_db.pool, ImportType::StudentList, &duplicates)
            .await
            .expect("import failed");

        assert_eq!(summary.created, 0);
        assert_eq!(summary.skipped, 2);

        let students = list_students(&test_db.pool).await.expect("query failed");
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].name, "A");
    }

    #[tokio::test]
    async fn test_arrear_import_for_unknown_student() {
        let test_db = TestDbBuilder::new().build().await.expect("build failed");

        let rows = vec![row(json!({
            "Name": "Ghost",
            "Reg no": "R404",
            "Dep": "CS",
            "Sem": 3,
            "Arrear sub": "MA101,MA102"
        }))];

        run_import(&test_db.pool, ImportType::ArrearList, &rows)
            .await
            .expect("import failed");

        let students = list_students(&test_db.pool).await.expect("query failed");
        assert!(students.is_empty(), "Student collection must stay unchanged");

        let arrears = list_arrears_for_reg(&test_db.pool, "R404")
            .await
            .expect("query failed");
        assert_eq!(arrears.len(), 1);
        assert_eq!(arrears[0].subjects, vec!["MA101", "MA102"]);

        // Re-importing appends a second audit row, no dedup.
        run_import(&test_db.pool, ImportType::ArrearList, &rows)
            .await
            .expect("import failed");

        let arrears = list_arrears_for_reg(&test_db.pool, "R404")
            .await
            .expect("query failed");
        assert_eq!(arrears.len(), 2);
    }

    #[tokio::test]
    async fn test_arrear_import_replaces_student_arrears() {
        let test_db = TestDbBuilder::new()
            .student("R1", "Asha", "asha@example.edu", "CS", 3)
            .arrear("R1", "Asha", "CS", 3, &["OLD1"])
            .build()
            .await
            .expect("build failed");

        let rows = vec![row(json!({
            "Name": "Asha",
            "Reg no": "R1",
            "Dep": "CS",
            "Sem": 3,
            "Arrear sub": "MA101,MA102"
        }))];

        run_import(&test_db.pool, ImportType::ArrearList, &rows)
            .await
            .expect("import failed");

        let student = find_student_by_reg(&test_db.pool, "R1")
            .await
            .expect("query failed")
            .expect("student missing");

        // Field replacement, not a merge with the previous list.
        assert_eq!(student.arrears, vec!["MA101", "MA102"]);
    }

    #[tokio::test]
    async fn test_attendance_import_updates_student_and_appends_snapshot() {
        let test_db = TestDbBuilder::new()
            .student("R1", "Asha", "asha@example.edu", "CS", 3)
            .build()
            .await
            .expect("build failed");

        let rows = vec![
            row(json!({
                "Name": "Asha",
                "Reg no": "R1",
                "Dep": "CS",
                "Sem": 3,
                "Email": "asha@example.edu",
                "Percentage": "82.5",
                "Fees Status": "PAID"
            })),
            row(json!({
                "Name": "Ghost",
                "Reg no": "R404",
                "Dep": "CS",
                "Sem": 3,
                "Email": "ghost@example.edu",
                "Percentage": 40,
                "Fees Status": "Unpaid"
            })),
        ];

        let summary = run_import(&test_db.pool, ImportType::Attendance, &rows)
            .await
            .expect("import failed");

        assert_eq!(summary.updated, 1);

        let student = find_student_by_reg(&test_db.pool, "R1")
            .await
            .expect("query failed")
            .expect("student missing");

        assert_eq!(student.attendance, 82.5);
        assert!(student.fees_paid, "fee status comparison is case-insensitive");

        // Snapshots are appended even when the student is unknown.
        let known = list_attendance_for_reg(&test_db.pool, "R1")
            .await
            .expect("query failed");
        assert_eq!(known.len(), 1);
        assert!(known[0].fees_paid);

        let unknown = list_attendance_for_reg(&test_db.pool, "R404")
            .await
            .expect("query failed");
        assert_eq!(unknown.len(), 1);
        assert!(!unknown[0].fees_paid);
    }

    #[tokio::test]
    async fn test_subject_import_dedups_by_code() {
        let test_db = TestDbBuilder::new().build().await.expect("build failed");

        let rows = vec![row(json!({
            "Subject Code": "CS301",
            "Subject Name": "Algorithms",
            "Dept": "CS",
            "Sem": "3",
            "Cost": 1500
        }))];

        run_import(&test_db.pool, ImportType::SubjectList, &rows)
            .await
            .expect("import failed");

        let duplicate = vec![row(json!({
            "Subject Code": "CS301",
            "Subject Name": "Algorithms v2",
            "Dept": "CS",
            "Sem": 3,
            "Cost": 9999
        }))];

        let summary = run_import(&test_db.pool, ImportType::SubjectList, &duplicate)
            .await
            .expect("import failed");

        assert_eq!(summary.created, 0);
        assert_eq!(summary.skipped, 1);

        let subjects = list_subjects(&test_db.pool).await.expect("query failed");
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].name, "Algorithms");
        assert_eq!(subjects[0].cost, 1500.0);
    }

    #[tokio::test]
    async fn test_missing_column_rejects_whole_batch() {
        let test_db = TestDbBuilder::new().build().await.expect("build failed");

        let rows = vec![
            row(json!({
                "Name": "A",
                "Reg no": "R1",
                "Email": "a@x.com",
                "Dep": "CS",
                "Sem": 3
            })),
            // Second row is missing its Email column.
            row(json!({
                "Name": "B",
                "Reg no": "R2",
                "Dep": "CS",
                "Sem": 3
            })),
        ];

        let err = run_import(&test_db.pool, ImportType::StudentList, &rows)
            .await
            .expect_err("import should fail");

        match err {
            AppError::Validation(msg) => {
                assert!(msg.contains("Row 2"), "unexpected message: {}", msg);
                assert!(msg.contains("Email"), "unexpected message: {}", msg);
            }
            other => panic!("Expected Validation error, got {:?}", other),
        }

        // Rows are validated before any write, so the valid first row must
        // not have been persisted either.
        let students = list_students(&test_db.pool).await.expect("query failed");
        assert!(students.is_empty());
    }
}
