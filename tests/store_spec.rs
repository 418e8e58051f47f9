use chrono::{Duration, Utc};
use code_arena::errors::CommandError;
use code_arena::models::*;
use code_arena::store::Store;
use speculate2::speculate;
use uuid::Uuid;

fn create_test_issue(store: &Store, tag: &str) -> Issue {
    store
        .create_issue(CreateIssueInput {
            title: "Fix navigation bug".to_string(),
            tags: vec![tag.to_string()],
            repo: "awesome-repo".to_string(),
        })
        .expect("Failed to create issue")
}

fn team_points(store: &Store, name: &str) -> i64 {
    store
        .get_team(name)
        .expect("Query failed")
        .expect("Team missing")
        .points
}

speculate! {
    before {
        let store = Store::open_memory().expect("Failed to create in-memory store");
        store.migrate().expect("Failed to run migrations");
        store.seed_teams(&["TeamAlpha", "TeamBravo"]).expect("Failed to seed teams");
    }

    describe "teams" {
        describe "seed_teams" {
            it "is idempotent and never resets points" {
                assert!(store.adjust_points("TeamAlpha", 25).expect("Adjust failed"));

                store.seed_teams(&["TeamAlpha", "TeamBravo"]).expect("Failed to re-seed");

                assert_eq!(team_points(&store, "TeamAlpha"), 25);
                assert_eq!(store.all_teams().expect("Query failed").len(), 2);
            }
        }

        describe "try_activate" {
            it "opens a session only when none is held" {
                assert!(store.try_activate("TeamAlpha").expect("Activate failed"));
                assert!(!store.try_activate("TeamAlpha").expect("Activate failed"));
            }

            it "allows a fresh session after deactivation" {
                assert!(store.try_activate("TeamAlpha").expect("Activate failed"));
                store.deactivate("TeamAlpha").expect("Deactivate failed");
                assert!(store.try_activate("TeamAlpha").expect("Activate failed"));
            }
        }

        describe "reset_active_flags" {
            it "clears every session" {
                store.try_activate("TeamAlpha").expect("Activate failed");
                store.try_activate("TeamBravo").expect("Activate failed");

                store.reset_active_flags().expect("Reset failed");

                for team in store.all_teams().expect("Query failed") {
                    assert!(!team.active);
                }
            }
        }

        describe "adjust_points" {
            it "clamps at zero instead of going negative" {
                store.adjust_points("TeamAlpha", 7).expect("Adjust failed");
                store.adjust_points("TeamAlpha", -20).expect("Adjust failed");

                assert_eq!(team_points(&store, "TeamAlpha"), 0);
            }

            it "returns false for an unknown team" {
                assert!(!store.adjust_points("TeamZulu", 10).expect("Adjust failed"));
            }
        }

        describe "all_teams" {
            it "ranks by points descending" {
                store.adjust_points("TeamBravo", 30).expect("Adjust failed");
                store.adjust_points("TeamAlpha", 10).expect("Adjust failed");

                let teams = store.all_teams().expect("Query failed");
                assert_eq!(teams[0].name, "TeamBravo");
                assert_eq!(teams[1].name, "TeamAlpha");
            }
        }
    }

    describe "repositories" {
        it "seeds only into an empty collection" {
            store.seed_repositories(&[("awesome-repo", "https://github.com/example/awesome-repo")])
                .expect("Seed failed");
            store.seed_repositories(&[("ui-kit", "https://github.com/example/ui-kit")])
                .expect("Seed failed");

            let repos = store.all_repositories().expect("Query failed");
            assert_eq!(repos.len(), 1);
            assert_eq!(repos[0].name, "awesome-repo");
        }

        it "re-registering a taken name keeps the stored row" {
            store.create_repository(CreateRepositoryInput {
                name: "lib-helpers".to_string(),
                url: "https://github.com/example/lib-helpers".to_string(),
            }).expect("Create failed");

            let kept = store.create_repository(CreateRepositoryInput {
                name: "lib-helpers".to_string(),
                url: "https://github.com/hijack/lib-helpers".to_string(),
            }).expect("Create failed");
            assert_eq!(kept.url, "https://github.com/example/lib-helpers");

            let repos = store.all_repositories().expect("Query failed");
            assert_eq!(repos.len(), 1);
            assert_eq!(repos[0].url, "https://github.com/example/lib-helpers");
        }

        it "creates and deletes by name" {
            store.create_repository(CreateRepositoryInput {
                name: "lib-helpers".to_string(),
                url: "https://github.com/example/lib-helpers".to_string(),
            }).expect("Create failed");

            assert!(store.delete_repository("lib-helpers").expect("Delete failed"));
            assert!(!store.delete_repository("lib-helpers").expect("Delete failed"));
        }
    }

    describe "issues" {
        describe "create_issue" {
            it "starts open with no reward paid" {
                let issue = create_test_issue(&store, "easy");

                assert_eq!(issue.state, IssueState::Open);
                assert!(!issue.points_awarded);

                let back = store.get_issue(issue.id).expect("Query failed").expect("Missing");
                assert_eq!(back, issue);
            }
        }

        describe "occupy_issue" {
            it "claims an open issue" {
                let issue = create_test_issue(&store, "easy");
                let now = Utc::now();

                let held = store.occupy_issue(issue.id, "TeamAlpha", now).expect("Occupy failed");
                assert_eq!(held.assigned_to(), Some("TeamAlpha"));

                let back = store.get_issue(issue.id).expect("Query failed").expect("Missing");
                assert_eq!(back.status(), IssueStatus::Occupied);
            }

            it "the second claimant loses with a conflict" {
                let issue = create_test_issue(&store, "easy");
                store.occupy_issue(issue.id, "TeamAlpha", Utc::now()).expect("Occupy failed");

                let err = store.occupy_issue(issue.id, "TeamBravo", Utc::now()).unwrap_err();
                assert_eq!(err.command(), Some(&CommandError::AlreadyOccupied));
            }

            it "refuses a fourth concurrent claim by the same team" {
                for _ in 0..3 {
                    let issue = create_test_issue(&store, "easy");
                    store.occupy_issue(issue.id, "TeamAlpha", Utc::now()).expect("Occupy failed");
                }

                let fourth = create_test_issue(&store, "easy");
                let err = store.occupy_issue(fourth.id, "TeamAlpha", Utc::now()).unwrap_err();
                assert_eq!(err.command(), Some(&CommandError::QuotaExceeded { max: 3 }));
            }

            it "returns not found for a missing issue" {
                let err = store.occupy_issue(Uuid::new_v4(), "TeamAlpha", Utc::now()).unwrap_err();
                assert_eq!(err.command(), Some(&CommandError::NotFound("Issue")));
            }
        }

        describe "close_issue" {
            it "records the submission" {
                let issue = create_test_issue(&store, "medium");
                store.occupy_issue(issue.id, "TeamAlpha", Utc::now()).expect("Occupy failed");

                let closed = store.close_issue(
                    issue.id,
                    "TeamAlpha",
                    "https://github.com/example/awesome-repo/pull/42",
                    Utc::now(),
                ).expect("Close failed");

                assert_eq!(closed.status(), IssueStatus::Closed);
                let back = store.get_issue(issue.id).expect("Query failed").expect("Missing");
                let IssueState::Closed { pr_url, pr_status, .. } = back.state else {
                    panic!("expected closed state");
                };
                assert_eq!(pr_url.as_deref(), Some("https://github.com/example/awesome-repo/pull/42"));
                assert_eq!(pr_status, PrStatus::Pending);
            }

            it "rejects a non-owner" {
                let issue = create_test_issue(&store, "medium");
                store.occupy_issue(issue.id, "TeamAlpha", Utc::now()).expect("Occupy failed");

                let err = store.close_issue(
                    issue.id,
                    "TeamBravo",
                    "https://github.com/example/awesome-repo/pull/42",
                    Utc::now(),
                ).unwrap_err();
                assert_eq!(err.command(), Some(&CommandError::NotOwner));
            }
        }

        describe "review_issue" {
            before {
                let issue = create_test_issue(&store, "hard");
                store.occupy_issue(issue.id, "TeamAlpha", Utc::now()).expect("Occupy failed");
                store.close_issue(
                    issue.id,
                    "TeamAlpha",
                    "https://github.com/example/awesome-repo/pull/42",
                    Utc::now(),
                ).expect("Close failed");
            }

            it "merge pays the reward exactly once" {
                let merged = store.review_issue(issue.id, ReviewDecision::Merge)
                    .expect("Review failed");
                assert!(merged.points_awarded);
                assert_eq!(team_points(&store, "TeamAlpha"), 30);

                // An admin repeating the decision must not double-pay.
                store.review_issue(issue.id, ReviewDecision::Merge).expect("Review failed");
                assert_eq!(team_points(&store, "TeamAlpha"), 30);
            }

            it "approve then merge still pays once" {
                store.review_issue(issue.id, ReviewDecision::Approve).expect("Review failed");
                assert_eq!(team_points(&store, "TeamAlpha"), 0);

                store.review_issue(issue.id, ReviewDecision::Merge).expect("Review failed");
                assert_eq!(team_points(&store, "TeamAlpha"), 30);
            }

            it "reject moves no points and can be revisited" {
                let rejected = store.review_issue(issue.id, ReviewDecision::Reject)
                    .expect("Review failed");
                let IssueState::Closed { pr_status, .. } = rejected.state else {
                    panic!("expected closed state");
                };
                assert_eq!(pr_status, PrStatus::Rejected);
                assert_eq!(team_points(&store, "TeamAlpha"), 0);
            }

            it "rejects review of an issue that is not closed" {
                let open = create_test_issue(&store, "hard");
                let err = store.review_issue(open.id, ReviewDecision::Merge).unwrap_err();
                assert_eq!(err.command(), Some(&CommandError::InvalidState));
            }
        }

        describe "expire_issue" {
            it "resets the issue and applies the penalty in one step" {
                store.adjust_points("TeamAlpha", 50).expect("Adjust failed");
                let issue = create_test_issue(&store, "easy");
                let occupied_at = Utc::now() - Duration::minutes(30);
                store.occupy_issue(issue.id, "TeamAlpha", occupied_at).expect("Occupy failed");

                let expired = store.expire_issue(issue.id, Utc::now()).expect("Expire failed");
                assert!(expired);

                let back = store.get_issue(issue.id).expect("Query failed").expect("Missing");
                assert_eq!(back.state, IssueState::Open);
                assert_eq!(team_points(&store, "TeamAlpha"), 45);
            }

            it "penalty clamps at zero" {
                let issue = create_test_issue(&store, "hard");
                let occupied_at = Utc::now() - Duration::minutes(90);
                store.occupy_issue(issue.id, "TeamAlpha", occupied_at).expect("Occupy failed");

                assert!(store.expire_issue(issue.id, Utc::now()).expect("Expire failed"));
                assert_eq!(team_points(&store, "TeamAlpha"), 0);
            }

            it "is a no-op before the deadline" {
                let issue = create_test_issue(&store, "easy");
                store.occupy_issue(issue.id, "TeamAlpha", Utc::now()).expect("Occupy failed");

                assert!(!store.expire_issue(issue.id, Utc::now()).expect("Expire failed"));
                let back = store.get_issue(issue.id).expect("Query failed").expect("Missing");
                assert_eq!(back.status(), IssueStatus::Occupied);
            }

            it "is a no-op for open issues, missing issues and repeat sweeps" {
                let issue = create_test_issue(&store, "easy");
                assert!(!store.expire_issue(issue.id, Utc::now()).expect("Expire failed"));
                assert!(!store.expire_issue(Uuid::new_v4(), Utc::now()).expect("Expire failed"));

                let occupied_at = Utc::now() - Duration::minutes(30);
                store.occupy_issue(issue.id, "TeamAlpha", occupied_at).expect("Occupy failed");
                assert!(store.expire_issue(issue.id, Utc::now()).expect("Expire failed"));
                assert!(!store.expire_issue(issue.id, Utc::now()).expect("Expire failed"));
                assert_eq!(team_points(&store, "TeamAlpha"), 0);
            }

            it "never expires an issue whose first tag is not a difficulty" {
                let issue = create_test_issue(&store, "frontend");
                let occupied_at = Utc::now() - Duration::days(365);
                store.occupy_issue(issue.id, "TeamAlpha", occupied_at).expect("Occupy failed");

                assert!(!store.expire_issue(issue.id, Utc::now()).expect("Expire failed"));
            }
        }

        describe "seed_issues" {
            it "seeds only into an empty collection" {
                store.seed_issues(&[("Fix navigation bug", "easy", "awesome-repo")])
                    .expect("Seed failed");
                store.seed_issues(&[("Implement dark mode", "medium", "ui-kit")])
                    .expect("Seed failed");

                let issues = store.all_issues().expect("Query failed");
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].title, "Fix navigation bug");
            }
        }

        describe "force overrides" {
            it "force_assign reopens an occupied issue when un-assigned" {
                let issue = create_test_issue(&store, "easy");
                store.occupy_issue(issue.id, "TeamAlpha", Utc::now()).expect("Occupy failed");

                let reset = store.force_assign_issue(issue.id, None, Utc::now())
                    .expect("Force failed");
                assert_eq!(reset.state, IssueState::Open);
            }

            it "force_status closed then back to occupied stays consistent" {
                let issue = create_test_issue(&store, "easy");
                store.occupy_issue(issue.id, "TeamAlpha", Utc::now()).expect("Occupy failed");

                let closed = store.force_status_issue(issue.id, IssueStatus::Closed, Utc::now())
                    .expect("Force failed");
                assert_eq!(closed.status(), IssueStatus::Closed);
                assert_eq!(closed.assigned_to(), Some("TeamAlpha"));

                let reopened = store.force_status_issue(issue.id, IssueStatus::Occupied, Utc::now())
                    .expect("Force failed");
                assert_eq!(reopened.assigned_to(), Some("TeamAlpha"));

                let back = store.get_issue(issue.id).expect("Query failed").expect("Missing");
                assert_eq!(back.status(), IssueStatus::Occupied);
            }
        }
    }

    describe "migrations" {
        it "running twice is harmless" {
            store.migrate().expect("Second migrate failed");
            create_test_issue(&store, "easy");
        }
    }

    describe "open" {
        it "persists across re-opens" {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let path = dir.path().join("arena.db");
            {
                let disk = Store::open(path.clone()).expect("Open failed");
                disk.migrate().expect("Migrate failed");
                disk.seed_teams(&["TeamCharlie"]).expect("Seed failed");
                disk.adjust_points("TeamCharlie", 9).expect("Adjust failed");
            }

            let reopened = Store::open(path).expect("Re-open failed");
            reopened.migrate().expect("Migrate failed");
            assert_eq!(team_points(&reopened, "TeamCharlie"), 9);
        }
    }
}
