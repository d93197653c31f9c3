//! Shipped default stage templates.

use serde::Deserialize;
use tracing::warn;

use crate::stages::{DocumentType, Stage};

/// Default stage sets for both document types, in the stored stage schema.
pub const DEFAULT_STAGES_JSON: &str = r#"{
  "requirements": [
    {
      "id": 1,
      "content": "以下の要件に基づいて機能を開発すること。",
      "substages": []
    },
    {
      "id": 2,
      "content": "上記の要件を詳細にPlanningして、開発計画を提示すること。",
      "substages": []
    },
    {
      "id": 3,
      "content": "ユーザーがPlanningを承認したら、{agent-仕様設計担当}にdocs/specs/配下に仕様書を作成させること。",
      "substages": [
        {
          "id": 31,
          "content": "specs/配下に分類可能な既存フォルダがあるかを確認し、ない場合は新規作成・ある場合はフォルダへ保存すること。"
        }
      ]
    },
    {
      "id": 4,
      "content": "仕様書の保存後、その仕様書に基づいて{agent-実装担当}に実装を行わせること。",
      "substages": []
    },
    {
      "id": 5,
      "content": "実装が完了したら、{agent-コードレビュー担当}を起動して、コードレビューを実施すること。",
      "substages": [
        {
          "id": 51,
          "content": "指摘事項があれば{agent-実装担当}に修正させ、再度レビューを行うこと。"
        }
      ]
    },
    {
      "id": 6,
      "content": "コードレビューが完了したら、ユーザーに最終成果物を提出すること。",
      "substages": [
        {
          "id": 61,
          "content": "各エージェントの出力は必ず次のエージェントへのインプットとして使用されるため、正確かつ詳細に記述すること。"
        }
      ]
    }
  ],
  "issues": [
    {
      "id": 1,
      "content": "以下の課題を探索し、改善策を提示すること。",
      "substages": []
    },
    {
      "id": 2,
      "content": "上記の課題を{agent-探索担当}で探索すること。",
      "substages": []
    },
    {
      "id": 3,
      "content": "探索結果に基づいて、改善策をPlanningすること。",
      "substages": []
    },
    {
      "id": 4,
      "content": "Planning結果をユーザーが承認したら、{agent-仕様設計担当}で仕様設計書を作成すること。",
      "substages": []
    },
    {
      "id": 5,
      "content": "仕様設計書の作成が完了したら、{agent-実装担当}を起動して、実装を行うこと。",
      "substages": []
    },
    {
      "id": 6,
      "content": "実装が完了したら、{agent-コードレビュー担当}を起動して、コードレビューを実施すること。",
      "substages": []
    },
    {
      "id": 7,
      "content": "コードレビューが完了したら、ユーザーに最終成果物を提出すること。",
      "substages": [
        {
          "id": 71,
          "content": "各エージェントの出力は必ず次のエージェントへのインプットとして使用されるため、正確かつ詳細に記述すること。"
        }
      ]
    }
  ]
}"#;

#[derive(Debug, Deserialize)]
struct DefaultStages {
    requirements: Vec<Stage>,
    issues: Vec<Stage>,
}

/// The shipped stage set for `doc`.
pub fn default_stages(doc: DocumentType) -> Vec<Stage> {
    match serde_json::from_str::<DefaultStages>(DEFAULT_STAGES_JSON) {
        Ok(defaults) => match doc {
            DocumentType::Requirements => defaults.requirements,
            DocumentType::Issues => defaults.issues,
        },
        Err(e) => {
            warn!(error = %e, "default_stages_parse_failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{detect_placeholders, is_current_schema};

    #[test]
    fn test_default_stages_parse_for_both_types() {
        for doc in DocumentType::ALL {
            let stages = default_stages(doc);
            assert!(!stages.is_empty(), "{doc} defaults should not be empty");
            assert!(is_current_schema(&stages));
            assert!(stages.iter().all(|s| s.has_substages_marker()));
        }
    }

    #[test]
    fn test_default_requirements_placeholders() {
        let stages = default_stages(DocumentType::Requirements);
        assert_eq!(
            detect_placeholders(&stages),
            vec![
                "agent-仕様設計担当",
                "agent-実装担当",
                "agent-コードレビュー担当"
            ]
        );
    }

    #[test]
    fn test_default_issues_start_with_explorer() {
        let stages = default_stages(DocumentType::Issues);
        assert_eq!(detect_placeholders(&stages)[0], "agent-探索担当");
    }

    #[test]
    fn test_default_ids_unique_per_list() {
        for doc in DocumentType::ALL {
            let stages = default_stages(doc);
            let mut ids: Vec<i64> = stages
                .iter()
                .flat_map(|s| std::iter::once(s.id).chain(s.substages().iter().map(|x| x.id)))
                .collect();
            let total = ids.len();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), total);
        }
    }
}
